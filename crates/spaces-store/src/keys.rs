//! Key encoding utilities for `RocksDB`.
//!
//! This module provides functions to encode and decode keys for the primary
//! tables and their indexes. All keys are designed to support efficient prefix scans.
//!
//! Device-level role assignments have no channel; they are encoded with the nil
//! UUID in the channel position.

use spaces_core::{ChannelId, DeviceId, EndpointId, RoutingId, SpaceId};

use crate::types::RoleDomain;

const ID_LEN: usize = 16;
const ROLE_KEY_LEN: usize = ID_LEN * 3 + 1;

/// Decoded parts of a role key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleKeyParts {
    /// Owning space.
    pub space_id: SpaceId,
    /// Role domain.
    pub domain: RoleDomain,
    /// Assigned device.
    pub device_id: DeviceId,
    /// Assigned channel.
    pub channel_id: Option<ChannelId>,
}

fn channel_bytes(channel_id: Option<&ChannelId>) -> [u8; ID_LEN] {
    channel_id.map_or([0u8; ID_LEN], |c| *c.as_bytes())
}

fn read_id(key: &[u8], offset: usize) -> Option<[u8; ID_LEN]> {
    key.get(offset..offset + ID_LEN)?.try_into().ok()
}

fn decode_channel(bytes: [u8; ID_LEN]) -> Option<ChannelId> {
    (bytes != [0u8; ID_LEN]).then(|| ChannelId::from_bytes(bytes))
}

/// Encode a role key: `space_id || domain || device_id || channel_id`.
#[must_use]
pub fn role_key(parts: &RoleKeyParts) -> Vec<u8> {
    let mut key = Vec::with_capacity(ROLE_KEY_LEN);
    key.extend_from_slice(parts.space_id.as_bytes());
    key.push(parts.domain.as_u8());
    key.extend_from_slice(parts.device_id.as_bytes());
    key.extend_from_slice(&channel_bytes(parts.channel_id.as_ref()));
    key
}

/// Encode a device-index role key: `device_id || channel_id || domain || space_id`.
///
/// Allows prefix scans by device and by `(device, channel)`.
#[must_use]
pub fn device_role_key(parts: &RoleKeyParts) -> Vec<u8> {
    let mut key = Vec::with_capacity(ROLE_KEY_LEN);
    key.extend_from_slice(parts.device_id.as_bytes());
    key.extend_from_slice(&channel_bytes(parts.channel_id.as_ref()));
    key.push(parts.domain.as_u8());
    key.extend_from_slice(parts.space_id.as_bytes());
    key
}

/// Decode a primary role key.
#[must_use]
pub fn decode_role_key(key: &[u8]) -> Option<RoleKeyParts> {
    if key.len() != ROLE_KEY_LEN {
        return None;
    }
    Some(RoleKeyParts {
        space_id: SpaceId::from_bytes(read_id(key, 0)?),
        domain: RoleDomain::from_u8(key[ID_LEN])?,
        device_id: DeviceId::from_bytes(read_id(key, ID_LEN + 1)?),
        channel_id: decode_channel(read_id(key, ID_LEN * 2 + 1)?),
    })
}

/// Decode a device-index role key.
#[must_use]
pub fn decode_device_role_key(key: &[u8]) -> Option<RoleKeyParts> {
    if key.len() != ROLE_KEY_LEN {
        return None;
    }
    Some(RoleKeyParts {
        device_id: DeviceId::from_bytes(read_id(key, 0)?),
        channel_id: decode_channel(read_id(key, ID_LEN)?),
        domain: RoleDomain::from_u8(key[ID_LEN * 2])?,
        space_id: SpaceId::from_bytes(read_id(key, ID_LEN * 2 + 1)?),
    })
}

/// Prefix for all roles of a space in one domain.
#[must_use]
pub fn space_domain_prefix(space_id: &SpaceId, domain: RoleDomain) -> Vec<u8> {
    let mut key = space_id.as_bytes().to_vec();
    key.push(domain.as_u8());
    key
}

/// Prefix for everything keyed by a space first.
#[must_use]
pub fn space_prefix(space_id: &SpaceId) -> Vec<u8> {
    space_id.as_bytes().to_vec()
}

/// Prefix for all device-index entries of a device.
#[must_use]
pub fn device_prefix(device_id: &DeviceId) -> Vec<u8> {
    device_id.as_bytes().to_vec()
}

/// Prefix for all device-index entries of one channel.
#[must_use]
pub fn device_channel_prefix(device_id: &DeviceId, channel_id: &ChannelId) -> Vec<u8> {
    let mut key = Vec::with_capacity(ID_LEN * 2);
    key.extend_from_slice(device_id.as_bytes());
    key.extend_from_slice(channel_id.as_bytes());
    key
}

/// Encode a routing key (just the routing ID bytes).
#[must_use]
pub fn routing_key(routing_id: &RoutingId) -> Vec<u8> {
    routing_id.as_bytes().to_vec()
}

/// Encode a space-routing index key: `space_id || routing_id`.
#[must_use]
pub fn space_routing_key(space_id: &SpaceId, routing_id: &RoutingId) -> Vec<u8> {
    let mut key = Vec::with_capacity(ID_LEN * 2);
    key.extend_from_slice(space_id.as_bytes());
    key.extend_from_slice(routing_id.as_bytes());
    key
}

/// Extract the routing ID from a space-routing key.
#[must_use]
pub fn extract_routing_id(key: &[u8]) -> Option<RoutingId> {
    read_id(key, ID_LEN).map(RoutingId::from_bytes)
}

/// Encode an endpoint key (just the endpoint ID bytes).
#[must_use]
pub fn endpoint_key(endpoint_id: &EndpointId) -> Vec<u8> {
    endpoint_id.as_bytes().to_vec()
}

/// Encode a space-endpoint index key: `space_id || endpoint_id`.
#[must_use]
pub fn space_endpoint_key(space_id: &SpaceId, endpoint_id: &EndpointId) -> Vec<u8> {
    let mut key = Vec::with_capacity(ID_LEN * 2);
    key.extend_from_slice(space_id.as_bytes());
    key.extend_from_slice(endpoint_id.as_bytes());
    key
}

/// Extract the endpoint ID from a space-endpoint key.
#[must_use]
pub fn extract_endpoint_id(key: &[u8]) -> Option<EndpointId> {
    read_id(key, ID_LEN).map(EndpointId::from_bytes)
}

/// Encode an active-routing key (just the space ID bytes).
#[must_use]
pub fn active_routing_key(space_id: &SpaceId) -> Vec<u8> {
    space_id.as_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(channel: Option<ChannelId>) -> RoleKeyParts {
        RoleKeyParts {
            space_id: SpaceId::from_bytes([1u8; 16]),
            domain: RoleDomain::Climate,
            device_id: DeviceId::from_bytes([2u8; 16]),
            channel_id: channel,
        }
    }

    #[test]
    fn role_keys_decode_both_layouts() {
        let with_channel = parts(Some(ChannelId::from_bytes([3u8; 16])));
        assert_eq!(decode_role_key(&role_key(&with_channel)), Some(with_channel));
        assert_eq!(
            decode_device_role_key(&device_role_key(&with_channel)),
            Some(with_channel)
        );
    }

    #[test]
    fn device_level_role_has_no_channel() {
        let device_level = parts(None);
        let key = role_key(&device_level);
        assert_eq!(key.len(), 49);
        assert_eq!(decode_role_key(&key).unwrap().channel_id, None);
    }

    #[test]
    fn prefixes_match_their_keys() {
        let p = parts(Some(ChannelId::from_bytes([3u8; 16])));
        let channel = p.channel_id.unwrap();

        assert!(role_key(&p).starts_with(&space_domain_prefix(&p.space_id, p.domain)));
        assert!(role_key(&p).starts_with(&space_prefix(&p.space_id)));
        assert!(device_role_key(&p).starts_with(&device_prefix(&p.device_id)));
        assert!(device_role_key(&p).starts_with(&device_channel_prefix(&p.device_id, &channel)));
        assert!(!role_key(&p).starts_with(&space_domain_prefix(&p.space_id, RoleDomain::Covers)));
    }

    #[test]
    fn short_keys_are_rejected() {
        assert!(decode_role_key(&[0u8; 10]).is_none());
        assert!(extract_routing_id(&[0u8; 20]).is_none());
    }

    #[test]
    fn space_routing_key_roundtrip() {
        let space_id = SpaceId::generate();
        let routing_id = RoutingId::generate();
        let key = space_routing_key(&space_id, &routing_id);
        assert_eq!(extract_routing_id(&key), Some(routing_id));
    }
}
