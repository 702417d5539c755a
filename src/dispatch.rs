//! Workgroup geometry shared by the host and device back-ends.
//!
//! Every particle pass runs in groups of [`PARTICLE_GROUP_SIZE`] threads and
//! every terrain pass in square tiles of [`TERRAIN_TILE`]. The host back-end
//! chunks its parallel iterators with the same sizes so that both back-ends
//! see identical thread ids.

use crate::error::ConfigError;

/// Threads per group for passes over particle slots.
pub const PARTICLE_GROUP_SIZE: u32 = 128;

/// Edge length of a terrain tile (8×8 threads).
pub const TERRAIN_TILE: u32 = 8;

/// Elements scanned per workgroup by the hierarchical prefix sum.
pub const SCAN_BLOCK: u32 = 256;

/// Portable upper bound on workgroups along one dispatch dimension.
pub const MAX_GROUPS_PER_DIMENSION: u32 = 65_535;

/// Number of particle groups needed to cover `count` threads.
#[inline]
pub fn particle_groups(count: u32) -> u32 {
    count.div_ceil(PARTICLE_GROUP_SIZE)
}

/// Number of terrain tiles needed to cover a `width`×`height` grid.
#[inline]
pub fn terrain_tiles(width: u32, height: u32) -> (u32, u32) {
    (width.div_ceil(TERRAIN_TILE), height.div_ceil(TERRAIN_TILE))
}

/// Number of scan blocks needed to cover `count` elements.
#[inline]
pub fn scan_blocks(count: u32) -> u32 {
    count.div_ceil(SCAN_BLOCK)
}

/// Reject element counts that a one-dimensional dispatch cannot cover.
pub fn check_dispatch(count: u32, group_size: u32) -> Result<u32, ConfigError> {
    let groups = count.div_ceil(group_size);
    if groups > MAX_GROUPS_PER_DIMENSION {
        return Err(ConfigError::DispatchLimit {
            count,
            groups,
            max: MAX_GROUPS_PER_DIMENSION,
        });
    }
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_particle_groups_round_up() {
        assert_eq!(particle_groups(0), 0);
        assert_eq!(particle_groups(1), 1);
        assert_eq!(particle_groups(128), 1);
        assert_eq!(particle_groups(129), 2);
    }

    #[test]
    fn test_terrain_tiles() {
        assert_eq!(terrain_tiles(1920, 1080), (240, 135));
        assert_eq!(terrain_tiles(9, 1), (2, 1));
    }

    #[test]
    fn test_dispatch_limit() {
        assert!(check_dispatch(1 << 20, PARTICLE_GROUP_SIZE).is_ok());
        let err = check_dispatch(u32::MAX, PARTICLE_GROUP_SIZE).unwrap_err();
        assert!(matches!(err, ConfigError::DispatchLimit { .. }));
    }
}
