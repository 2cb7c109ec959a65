//! UE IP address pools.
//!
//! IPv4 addresses are handed out of one configurable CIDR block; IPv6 UEs
//! get the first host of a fresh /64 carved out of the configured prefix.
//! Allocated addresses stay reserved until the owning PFCP session is
//! deleted.

use std::collections::HashSet;
use std::net::{Ipv4Addr, Ipv6Addr};

use anyhow::Context as _;
use ipnetwork::{Ipv4Network, Ipv6Network};

pub struct Ipv4Pool {
    network: Ipv4Network,
    allocated: HashSet<Ipv4Addr>,
}

impl Ipv4Pool {
    pub fn new(cidr: &str) -> anyhow::Result<Self> {
        let network: Ipv4Network = cidr.parse().with_context(|| format!("invalid IPv4 pool CIDR: {cidr}"))?;

        Ok(Ipv4Pool {
            network,
            allocated: HashSet::new(),
        })
    }

    /// First free host address, or `None` when the pool is exhausted.
    pub fn allocate(&mut self) -> Option<Ipv4Addr> {
        let network_addr = self.network.network();
        let broadcast_addr = self.network.broadcast();

        for addr in self.network.iter() {
            if addr == network_addr || addr == broadcast_addr {
                continue;
            }
            if self.allocated.insert(addr) {
                return Some(addr);
            }
        }

        None
    }

    pub fn release(&mut self, addr: Ipv4Addr) -> bool {
        self.allocated.remove(&addr)
    }

    pub fn allocated_count(&self) -> usize {
        self.allocated.len()
    }

    pub fn cidr(&self) -> String {
        self.network.to_string()
    }
}

pub struct Ipv6Allocation {
    pub address: Ipv6Addr,
    /// The delegated /64 the address was taken from.
    pub prefix: String,
}

pub struct Ipv6Pool {
    network: Ipv6Network,
    allocated: HashSet<Ipv6Addr>,
    next_subnet: u128,
}

impl Ipv6Pool {
    pub fn new(cidr: &str) -> anyhow::Result<Self> {
        let network: Ipv6Network = cidr.parse().with_context(|| format!("invalid IPv6 pool CIDR: {cidr}"))?;

        anyhow::ensure!(
            network.prefix() <= 64,
            "IPv6 pool prefix must be /64 or shorter to delegate /64 subnets"
        );

        Ok(Ipv6Pool {
            network,
            allocated: HashSet::new(),
            next_subnet: 0,
        })
    }

    /// Next /64 subnet of the pool; the UE gets its first host address.
    pub fn allocate(&mut self) -> Option<Ipv6Allocation> {
        let subnet_bits = 64 - u32::from(self.network.prefix());
        let max_subnets: u128 = 1 << subnet_bits;
        let base = u128::from(self.network.network());

        while self.next_subnet < max_subnets {
            let index = self.next_subnet;
            self.next_subnet += 1;

            let subnet_base = base + (index << 64);
            let address = Ipv6Addr::from(subnet_base + 1);

            if self.allocated.insert(address) {
                let prefix = format!("{}/64", Ipv6Addr::from(subnet_base));
                return Some(Ipv6Allocation { address, prefix });
            }
        }

        None
    }

    pub fn release(&mut self, addr: Ipv6Addr) -> bool {
        self.allocated.remove(&addr)
    }

    pub fn allocated_count(&self) -> usize {
        self.allocated.len()
    }

    pub fn cidr(&self) -> String {
        self.network.to_string()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn slash_30_holds_exactly_two_hosts() {
        let mut pool = Ipv4Pool::new("10.0.0.0/30").unwrap();

        let first = pool.allocate().unwrap();
        let second = pool.allocate().unwrap();
        assert_eq!(first, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(second, Ipv4Addr::new(10, 0, 0, 2));

        assert!(pool.allocate().is_none(), "network and broadcast are reserved");
    }

    #[test]
    fn released_ipv4_address_is_reusable() {
        let mut pool = Ipv4Pool::new("10.0.0.0/30").unwrap();

        let first = pool.allocate().unwrap();
        let _second = pool.allocate().unwrap();
        assert!(pool.allocate().is_none());

        assert!(pool.release(first));
        assert_eq!(pool.allocate(), Some(first));
    }

    #[test]
    fn ipv6_allocations_are_distinct_64s() {
        let mut pool = Ipv6Pool::new("2001:db8:5::/48").unwrap();

        let a = pool.allocate().unwrap();
        let b = pool.allocate().unwrap();

        assert_ne!(a.address, b.address);
        assert_ne!(a.prefix, b.prefix);
        assert_eq!(a.prefix, "2001:db8:5::/64");
        assert_eq!(a.address.to_string(), "2001:db8:5::1");
        assert_eq!(pool.allocated_count(), 2);
    }
}
