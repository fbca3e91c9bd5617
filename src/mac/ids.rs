//! Network and radio device identifiers

use rand_core::RngCore;

/// Broadcast long RD ID
pub const LONG_RD_ID_BROADCAST: u32 = 0xFFFF_FFFF;

/// Long RD ID reserved for backend use
pub const LONG_RD_ID_BACKEND: u32 = 0xFFFF_FFFE;

/// Broadcast short RD ID
pub const SHORT_RD_ID_BROADCAST: u16 = 0xFFFF;

/// Network IDs need non-zero low 8 bits (the short network ID) and
/// non-zero upper 24 bits (carried in the beacon header)
pub fn is_valid_network_id(id: u32) -> bool {
    id & 0xFF != 0 && id >> 8 != 0
}

pub fn is_valid_long_rd_id(id: u32) -> bool {
    !matches!(id, 0 | LONG_RD_ID_BACKEND | LONG_RD_ID_BROADCAST)
}

pub fn is_valid_short_rd_id(id: u16) -> bool {
    !matches!(id, 0 | SHORT_RD_ID_BROADCAST)
}

/// Short network ID carried in the PHY control field
pub fn short_network_id(network_id: u32) -> u8 {
    network_id as u8
}

pub fn random_network_id<R: RngCore>(rng: &mut R) -> u32 {
    loop {
        let id = rng.next_u32();
        if is_valid_network_id(id) {
            return id;
        }
    }
}

pub fn random_long_rd_id<R: RngCore>(rng: &mut R) -> u32 {
    loop {
        let id = rng.next_u32();
        if is_valid_long_rd_id(id) {
            return id;
        }
    }
}

pub fn random_short_rd_id<R: RngCore>(rng: &mut R) -> u16 {
    loop {
        let id = rng.next_u32() as u16;
        if is_valid_short_rd_id(id) {
            return id;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn identifier_rules() {
        assert!(is_valid_network_id(0x0000_0101));
        assert!(!is_valid_network_id(0x1234_5600));
        assert!(!is_valid_network_id(0x0000_00FF));
        assert!(!is_valid_network_id(0));

        assert!(is_valid_long_rd_id(1));
        assert!(!is_valid_long_rd_id(0));
        assert!(!is_valid_long_rd_id(0xFFFF_FFFE));
        assert!(!is_valid_long_rd_id(0xFFFF_FFFF));

        assert!(is_valid_short_rd_id(0x1234));
        assert!(!is_valid_short_rd_id(0));
        assert!(!is_valid_short_rd_id(0xFFFF));

        assert_eq!(short_network_id(0x1234_5678), 0x78);
    }

    #[test]
    fn generated_identifiers_are_valid() {
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..1000 {
            assert!(is_valid_network_id(random_network_id(&mut rng)));
            assert!(is_valid_long_rd_id(random_long_rd_id(&mut rng)));
            assert!(is_valid_short_rd_id(random_short_rd_id(&mut rng)));
        }
    }
}
