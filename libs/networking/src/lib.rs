//! Networking utilities for stack synthesis.
//!
//! This library provides helpers for:
//! - Parsing and validating IPv4 CIDR blocks against VPC limits
//! - Sequential, aligned block allocation inside a prefix
//! - Carving a VPC block into per-AZ public and private subnets

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Networking errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// Invalid IP address.
    #[error("invalid IP address: {0}")]
    InvalidAddress(String),

    /// Invalid CIDR prefix.
    #[error("invalid CIDR prefix: {0}")]
    InvalidPrefix(String),

    /// The address has bits set below the prefix.
    #[error("{cidr} has host bits set (network address is {network})")]
    HostBitsSet { cidr: String, network: Ipv4Addr },

    /// The prefix length is outside the allowed range for a VPC.
    #[error("prefix /{prefix} out of range (must be between /{min} and /{max})")]
    PrefixOutOfRange { prefix: u8, min: u8, max: u8 },

    /// The block cannot host the requested subnets.
    #[error(
        "{cidr} is too small for {subnets} subnets (needs /{required_prefix} subnets, smallest allowed is /{max_prefix})"
    )]
    InsufficientSpace {
        cidr: String,
        subnets: u32,
        required_prefix: u8,
        max_prefix: u8,
    },

    /// Address pool exhausted.
    #[error("address pool exhausted: {0}")]
    PoolExhausted(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

// ============================================================================
// CIDR blocks
// ============================================================================

/// Largest VPC block (smallest prefix length) the provider accepts.
pub const VPC_MIN_PREFIX: u8 = 16;

/// Smallest VPC block the provider accepts.
pub const VPC_MAX_PREFIX: u8 = 28;

/// Smallest subnet the provider accepts.
pub const SUBNET_MAX_PREFIX: u8 = 28;

/// An IPv4 network in CIDR notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ipv4Cidr {
    address: Ipv4Addr,
    prefix_len: u8,
}

impl Ipv4Cidr {
    /// Create a block. The address must be the network address.
    pub fn new(address: Ipv4Addr, prefix_len: u8) -> Result<Self, NetworkError> {
        if prefix_len > 32 {
            return Err(NetworkError::InvalidPrefix(format!(
                "prefix length {} exceeds 32",
                prefix_len
            )));
        }

        let network = mask_ipv4(address, prefix_len);
        if network != address {
            return Err(NetworkError::HostBitsSet {
                cidr: format!("{}/{}", address, prefix_len),
                network,
            });
        }

        Ok(Self {
            address,
            prefix_len,
        })
    }

    /// Parse from CIDR notation (e.g., "10.0.0.0/16").
    pub fn from_cidr(s: &str) -> Result<Self, NetworkError> {
        let s = s.trim();
        let Some((addr_str, prefix_str)) = s.split_once('/') else {
            return Err(NetworkError::InvalidPrefix(format!(
                "missing '/' in CIDR: {}",
                s
            )));
        };

        let address = Ipv4Addr::from_str(addr_str)
            .map_err(|_| NetworkError::InvalidAddress(addr_str.to_string()))?;

        let prefix_len = prefix_str
            .parse::<u8>()
            .map_err(|_| NetworkError::InvalidPrefix(prefix_str.to_string()))?;

        Self::new(address, prefix_len)
    }

    /// Network address.
    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    /// Prefix length.
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Number of addresses in the block.
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix_len))
    }

    /// Last address in the block.
    pub fn last(&self) -> Ipv4Addr {
        let base = u64::from(u32::from(self.address));
        Ipv4Addr::from((base + self.size() - 1) as u32)
    }

    /// Check if an address is within this block.
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        mask_ipv4(addr, self.prefix_len) == self.address
    }

    /// Check if another block lies entirely within this one.
    pub fn contains_cidr(&self, other: &Ipv4Cidr) -> bool {
        other.prefix_len >= self.prefix_len && self.contains(other.address)
    }

    /// Check if two blocks share any address.
    pub fn overlaps(&self, other: &Ipv4Cidr) -> bool {
        self.contains_cidr(other) || other.contains_cidr(self)
    }

    /// Whether the block lies in RFC 1918 private space.
    pub fn is_private(&self) -> bool {
        const PRIVATE: [(Ipv4Addr, u8); 3] = [
            (Ipv4Addr::new(10, 0, 0, 0), 8),
            (Ipv4Addr::new(172, 16, 0, 0), 12),
            (Ipv4Addr::new(192, 168, 0, 0), 16),
        ];
        PRIVATE.iter().any(|(addr, len)| {
            let range = Ipv4Cidr {
                address: *addr,
                prefix_len: *len,
            };
            range.contains_cidr(self)
        })
    }

    /// Check the block against the provider's VPC size limits.
    pub fn validate_vpc(&self) -> Result<(), NetworkError> {
        if !(VPC_MIN_PREFIX..=VPC_MAX_PREFIX).contains(&self.prefix_len) {
            return Err(NetworkError::PrefixOutOfRange {
                prefix: self.prefix_len,
                min: VPC_MIN_PREFIX,
                max: VPC_MAX_PREFIX,
            });
        }
        Ok(())
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_cidr(s)
    }
}

impl Serialize for Ipv4Cidr {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Ipv4Cidr {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_cidr(&s).map_err(serde::de::Error::custom)
    }
}

/// Mask an IPv4 address to a prefix length.
fn mask_ipv4(addr: Ipv4Addr, prefix_len: u8) -> Ipv4Addr {
    let bits = u32::from(addr);
    let mask = if prefix_len == 0 {
        0
    } else if prefix_len >= 32 {
        u32::MAX
    } else {
        u32::MAX << (32 - prefix_len)
    };
    Ipv4Addr::from(bits & mask)
}

/// Sequential block allocator.
///
/// Blocks are handed out in address order, each aligned to its own size.
#[derive(Debug)]
pub struct Ipv4Allocator {
    /// Block to allocate from.
    prefix: Ipv4Cidr,

    /// Offset of the next free address.
    next_offset: u64,
}

impl Ipv4Allocator {
    /// Create a new allocator for a block.
    pub fn new(prefix: Ipv4Cidr) -> Self {
        Self {
            prefix,
            next_offset: 0,
        }
    }

    /// Allocate the next aligned block of the given prefix length.
    pub fn allocate(&mut self, prefix_len: u8) -> Result<Ipv4Cidr, NetworkError> {
        if prefix_len < self.prefix.prefix_len || prefix_len > 32 {
            return Err(NetworkError::InvalidPrefix(format!(
                "cannot allocate /{} from {}",
                prefix_len, self.prefix
            )));
        }

        let size = 1u64 << (32 - u32::from(prefix_len));
        let offset = self.next_offset.div_ceil(size) * size;
        if offset + size > self.prefix.size() {
            return Err(NetworkError::PoolExhausted(self.prefix.to_string()));
        }

        let base = u64::from(u32::from(self.prefix.address));
        self.next_offset = offset + size;

        Ipv4Cidr::new(Ipv4Addr::from((base + offset) as u32), prefix_len)
    }

    /// Get the block being allocated from.
    pub fn prefix(&self) -> &Ipv4Cidr {
        &self.prefix
    }

    /// Get remaining addresses.
    pub fn remaining(&self) -> u64 {
        self.prefix.size().saturating_sub(self.next_offset)
    }
}

// ============================================================================
// Subnet carving
// ============================================================================

/// Subnet tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubnetKind {
    /// Routed through the internet gateway; hosts the load balancer and NAT.
    Public,
    /// Egress through NAT only; hosts tasks, instances and mount targets.
    Private,
}

impl SubnetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

/// One carved subnet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubnetAllocation {
    pub kind: SubnetKind,
    pub az_index: u32,
    pub cidr: Ipv4Cidr,
}

/// Equal-sized subnets for each tier in each availability zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubnetPlan {
    vpc: Ipv4Cidr,
    subnets: Vec<SubnetAllocation>,
}

impl SubnetPlan {
    /// Carve `vpc` into `kinds.len() * max_azs` equal subnets.
    ///
    /// Subnets are allocated tier by tier, then AZ by AZ, so
    /// `10.0.0.0/16` with two AZs yields public `10.0.0.0/18`,
    /// `10.0.64.0/18` and private `10.0.128.0/18`, `10.0.192.0/18`.
    pub fn carve(vpc: Ipv4Cidr, max_azs: u32, kinds: &[SubnetKind]) -> Result<Self, NetworkError> {
        vpc.validate_vpc()?;

        if max_azs == 0 || kinds.is_empty() {
            return Err(NetworkError::Config(
                "at least one AZ and one subnet tier are required".to_string(),
            ));
        }

        let count = max_azs.saturating_mul(kinds.len() as u32);
        let extra_bits = count.next_power_of_two().trailing_zeros();
        let required_prefix = u32::from(vpc.prefix_len) + extra_bits;
        if required_prefix > u32::from(SUBNET_MAX_PREFIX) {
            return Err(NetworkError::InsufficientSpace {
                cidr: vpc.to_string(),
                subnets: count,
                required_prefix: required_prefix.min(u32::from(u8::MAX)) as u8,
                max_prefix: SUBNET_MAX_PREFIX,
            });
        }

        let mut allocator = Ipv4Allocator::new(vpc);
        let mut subnets = Vec::with_capacity(count as usize);
        for kind in kinds {
            for az_index in 0..max_azs {
                let cidr = allocator.allocate(required_prefix as u8)?;
                subnets.push(SubnetAllocation {
                    kind: *kind,
                    az_index,
                    cidr,
                });
            }
        }

        Ok(Self { vpc, subnets })
    }

    /// The VPC block that was carved.
    pub fn vpc(&self) -> &Ipv4Cidr {
        &self.vpc
    }

    /// All subnets in allocation order.
    pub fn subnets(&self) -> &[SubnetAllocation] {
        &self.subnets
    }

    /// Subnets of one tier, in AZ order.
    pub fn of_kind(&self, kind: SubnetKind) -> impl Iterator<Item = &SubnetAllocation> {
        self.subnets.iter().filter(move |s| s.kind == kind)
    }

    /// Returns the first pair of overlapping subnets, if any.
    pub fn find_overlap(&self) -> Option<(&SubnetAllocation, &SubnetAllocation)> {
        self.subnets.iter().enumerate().find_map(|(i, a)| {
            self.subnets[i + 1..]
                .iter()
                .find(|b| a.cidr.overlaps(&b.cidr))
                .map(|b| (a, b))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    const TIERS: [SubnetKind; 2] = [SubnetKind::Public, SubnetKind::Private];

    #[test]
    fn test_ipv4_cidr() {
        let cidr = Ipv4Cidr::from_cidr("10.0.0.0/16").unwrap();
        assert_eq!(cidr.prefix_len(), 16);
        assert_eq!(cidr.size(), 65536);
        assert_eq!(cidr.last(), Ipv4Addr::new(10, 0, 255, 255));

        assert!(cidr.contains(Ipv4Addr::new(10, 0, 3, 7)));
        assert!(!cidr.contains(Ipv4Addr::new(10, 1, 0, 0)));
        assert!(cidr.is_private());
        assert!(!Ipv4Cidr::from_cidr("8.8.0.0/16").unwrap().is_private());
    }

    #[rstest]
    #[case("10.0.0.0", "missing '/'")]
    #[case("10.0.0/16", "invalid IP address")]
    #[case("10.0.0.0/x", "invalid CIDR prefix")]
    #[case("10.0.0.0/33", "exceeds 32")]
    #[case("10.0.0.1/16", "host bits set")]
    fn test_malformed_cidr(#[case] input: &str, #[case] message: &str) {
        let err = Ipv4Cidr::from_cidr(input).unwrap_err();
        assert!(
            err.to_string().contains(message),
            "{input}: expected '{message}' in '{err}'"
        );
    }

    #[test]
    fn test_overlaps() {
        let a = Ipv4Cidr::from_cidr("10.0.0.0/16").unwrap();
        let b = Ipv4Cidr::from_cidr("10.0.128.0/18").unwrap();
        let c = Ipv4Cidr::from_cidr("10.1.0.0/16").unwrap();
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_allocator_aligns_blocks() {
        let mut allocator = Ipv4Allocator::new(Ipv4Cidr::from_cidr("10.0.0.0/24").unwrap());

        let small = allocator.allocate(28).unwrap();
        let large = allocator.allocate(26).unwrap();
        assert_eq!(small.to_string(), "10.0.0.0/28");
        assert_eq!(large.to_string(), "10.0.0.64/26");
        assert_eq!(allocator.remaining(), 128);

        allocator.allocate(25).unwrap();
        assert!(matches!(
            allocator.allocate(28),
            Err(NetworkError::PoolExhausted(_))
        ));
    }

    #[test]
    fn test_carve_default_vpc() {
        let vpc = Ipv4Cidr::from_cidr("10.0.0.0/16").unwrap();
        let plan = SubnetPlan::carve(vpc, 2, &TIERS).unwrap();

        let public: Vec<String> = plan
            .of_kind(SubnetKind::Public)
            .map(|s| s.cidr.to_string())
            .collect();
        let private: Vec<String> = plan
            .of_kind(SubnetKind::Private)
            .map(|s| s.cidr.to_string())
            .collect();

        assert_eq!(public, vec!["10.0.0.0/18", "10.0.64.0/18"]);
        assert_eq!(private, vec!["10.0.128.0/18", "10.0.192.0/18"]);
        assert!(plan.find_overlap().is_none());
    }

    #[rstest]
    #[case("10.0.0.0/15", 2)]
    #[case("10.0.0.0/27", 2)]
    #[case("10.0.0.0/28", 1)]
    #[case("10.0.0.0/26", 3)]
    fn test_carve_rejects_small_or_oversized_blocks(#[case] cidr: &str, #[case] azs: u32) {
        let vpc = Ipv4Cidr::from_cidr(cidr).unwrap();
        let err = SubnetPlan::carve(vpc, azs, &TIERS).unwrap_err();
        assert!(matches!(
            err,
            NetworkError::PrefixOutOfRange { .. } | NetworkError::InsufficientSpace { .. }
        ));
    }

    #[test]
    fn test_carve_minimum_block() {
        let vpc = Ipv4Cidr::from_cidr("10.0.0.0/26").unwrap();
        let plan = SubnetPlan::carve(vpc, 2, &TIERS).unwrap();
        assert!(plan.subnets().iter().all(|s| s.cidr.prefix_len() == 28));
    }

    #[test]
    fn test_cidr_serde() {
        let cidr: Ipv4Cidr = serde_json::from_str("\"172.16.0.0/20\"").unwrap();
        assert_eq!(serde_json::to_string(&cidr).unwrap(), "\"172.16.0.0/20\"");
        assert!(serde_json::from_str::<Ipv4Cidr>("\"172.16.0.1/20\"").is_err());
    }

    proptest! {
        #[test]
        fn prop_carved_subnets_are_disjoint_and_contained(
            octet in 0u8..=255,
            prefix in 16u8..=24,
            azs in 1u32..=4,
        ) {
            let base = mask_ipv4(Ipv4Addr::new(10, octet, 0, 0), prefix);
            let vpc = Ipv4Cidr::new(base, prefix).unwrap();
            let plan = SubnetPlan::carve(vpc, azs, &TIERS).unwrap();

            prop_assert_eq!(plan.subnets().len() as u32, azs * 2);
            prop_assert!(plan.find_overlap().is_none());
            for subnet in plan.subnets() {
                prop_assert!(vpc.contains_cidr(&subnet.cidr));
            }
        }
    }
}
