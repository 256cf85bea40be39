//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::path::Path;
use std::sync::Arc;

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};
use spaces_core::{ChannelId, DeviceId, EndpointId, RoutingId, SpaceId};

use crate::error::{Result, StoreError};
use crate::keys::{self, RoleKeyParts};
use crate::schema::{all_column_families, cf};
use crate::types::{ActiveRouting, MediaEndpoint, RoleAssignment, RoleDomain, RoutingDefinition};
use crate::Store;

type KeyValue = (Box<[u8]>, Box<[u8]>);

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Collect every entry of a column family whose key starts with `prefix`.
    fn scan_prefix(&self, name: &str, prefix: &[u8]) -> Result<Vec<KeyValue>> {
        let handle = self.cf(name)?;
        let mut entries = Vec::new();

        for item in self
            .db
            .iterator_cf(&handle, IteratorMode::From(prefix, Direction::Forward))
        {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key, value));
        }

        Ok(entries)
    }

    fn get_value<T: serde::de::DeserializeOwned>(&self, name: &str, key: &[u8]) -> Result<Option<T>> {
        let handle = self.cf(name)?;
        self.db
            .get_cf(&handle, key)?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    /// Delete role records and their index entries in one batch.
    fn delete_role_entries(&self, parts: &[RoleKeyParts]) -> Result<usize> {
        if parts.is_empty() {
            return Ok(0);
        }

        let cf_roles = self.cf(cf::ROLES)?;
        let cf_by_device = self.cf(cf::ROLES_BY_DEVICE)?;

        let mut batch = WriteBatch::default();
        for p in parts {
            batch.delete_cf(&cf_roles, keys::role_key(p));
            batch.delete_cf(&cf_by_device, keys::device_role_key(p));
        }
        self.db.write(batch)?;

        Ok(parts.len())
    }

    /// Role keys referenced by device-index entries under `prefix`.
    fn role_parts_from_device_index(&self, prefix: &[u8]) -> Result<Vec<RoleKeyParts>> {
        self.scan_prefix(cf::ROLES_BY_DEVICE, prefix)?
            .iter()
            .map(|(key, _)| {
                keys::decode_device_role_key(key).ok_or(StoreError::CorruptKey(cf::ROLES_BY_DEVICE))
            })
            .collect()
    }
}

fn role_parts(
    space_id: &SpaceId,
    domain: RoleDomain,
    device_id: &DeviceId,
    channel_id: Option<&ChannelId>,
) -> RoleKeyParts {
    RoleKeyParts {
        space_id: *space_id,
        domain,
        device_id: *device_id,
        channel_id: channel_id.copied(),
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Role Operations
    // =========================================================================

    fn put_role(&self, assignment: &RoleAssignment) -> Result<()> {
        let cf_roles = self.cf(cf::ROLES)?;
        let cf_by_device = self.cf(cf::ROLES_BY_DEVICE)?;

        let parts = role_parts(
            &assignment.space_id,
            assignment.domain(),
            &assignment.device_id,
            assignment.channel_id.as_ref(),
        );
        let value = Self::serialize(assignment)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_roles, keys::role_key(&parts), &value);
        batch.put_cf(&cf_by_device, keys::device_role_key(&parts), b"");
        self.db.write(batch)?;

        Ok(())
    }

    fn get_role(
        &self,
        space_id: &SpaceId,
        domain: RoleDomain,
        device_id: &DeviceId,
        channel_id: Option<&ChannelId>,
    ) -> Result<Option<RoleAssignment>> {
        let parts = role_parts(space_id, domain, device_id, channel_id);
        self.get_value(cf::ROLES, &keys::role_key(&parts))
    }

    fn delete_role(
        &self,
        space_id: &SpaceId,
        domain: RoleDomain,
        device_id: &DeviceId,
        channel_id: Option<&ChannelId>,
    ) -> Result<()> {
        if self.get_role(space_id, domain, device_id, channel_id)?.is_none() {
            return Err(StoreError::NotFound);
        }
        let parts = role_parts(space_id, domain, device_id, channel_id);
        self.delete_role_entries(&[parts])?;
        Ok(())
    }

    fn list_roles(&self, space_id: &SpaceId, domain: RoleDomain) -> Result<Vec<RoleAssignment>> {
        let prefix = keys::space_domain_prefix(space_id, domain);

        let mut roles = self
            .scan_prefix(cf::ROLES, &prefix)?
            .iter()
            .map(|(_, value)| Self::deserialize::<RoleAssignment>(value))
            .collect::<Result<Vec<_>>>()?;

        roles.sort_by_key(|r| (r.role, r.priority));
        Ok(roles)
    }

    fn delete_roles_by_space(&self, space_id: &SpaceId) -> Result<usize> {
        let parts = self
            .scan_prefix(cf::ROLES, &keys::space_prefix(space_id))?
            .iter()
            .map(|(key, _)| keys::decode_role_key(key).ok_or(StoreError::CorruptKey(cf::ROLES)))
            .collect::<Result<Vec<_>>>()?;

        let removed = self.delete_role_entries(&parts)?;
        tracing::debug!(space_id = %space_id, removed, "Deleted roles of space");
        Ok(removed)
    }

    fn delete_roles_by_device(&self, device_id: &DeviceId) -> Result<usize> {
        let parts = self.role_parts_from_device_index(&keys::device_prefix(device_id))?;
        let removed = self.delete_role_entries(&parts)?;
        tracing::debug!(device_id = %device_id, removed, "Deleted roles of device");
        Ok(removed)
    }

    fn delete_roles_by_channel(
        &self,
        device_id: &DeviceId,
        channel_id: &ChannelId,
    ) -> Result<usize> {
        let prefix = keys::device_channel_prefix(device_id, channel_id);
        let parts = self.role_parts_from_device_index(&prefix)?;
        self.delete_role_entries(&parts)
    }

    // =========================================================================
    // Media Endpoint Operations
    // =========================================================================

    fn put_endpoint(&self, endpoint: &MediaEndpoint) -> Result<()> {
        let cf_endpoints = self.cf(cf::ENDPOINTS)?;
        let cf_by_space = self.cf(cf::ENDPOINTS_BY_SPACE)?;

        let value = Self::serialize(endpoint)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_endpoints, keys::endpoint_key(&endpoint.endpoint_id), &value);
        batch.put_cf(
            &cf_by_space,
            keys::space_endpoint_key(&endpoint.space_id, &endpoint.endpoint_id),
            [],
        );
        self.db.write(batch)?;

        Ok(())
    }

    fn get_endpoint(&self, endpoint_id: &EndpointId) -> Result<Option<MediaEndpoint>> {
        self.get_value(cf::ENDPOINTS, &keys::endpoint_key(endpoint_id))
    }

    fn delete_endpoint(&self, endpoint_id: &EndpointId) -> Result<()> {
        let cf_endpoints = self.cf(cf::ENDPOINTS)?;
        let cf_by_space = self.cf(cf::ENDPOINTS_BY_SPACE)?;

        let endpoint = self.get_endpoint(endpoint_id)?.ok_or(StoreError::NotFound)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(&cf_endpoints, keys::endpoint_key(endpoint_id));
        batch.delete_cf(
            &cf_by_space,
            keys::space_endpoint_key(&endpoint.space_id, endpoint_id),
        );
        self.db.write(batch)?;

        Ok(())
    }

    fn list_endpoints_by_space(&self, space_id: &SpaceId) -> Result<Vec<MediaEndpoint>> {
        let mut endpoints = Vec::new();

        for (key, _) in self.scan_prefix(cf::ENDPOINTS_BY_SPACE, &keys::space_prefix(space_id))? {
            let endpoint_id = keys::extract_endpoint_id(&key)
                .ok_or(StoreError::CorruptKey(cf::ENDPOINTS_BY_SPACE))?;
            if let Some(endpoint) = self.get_endpoint(&endpoint_id)? {
                endpoints.push(endpoint);
            }
        }

        Ok(endpoints)
    }

    // =========================================================================
    // Routing Operations
    // =========================================================================

    fn put_routing(&self, routing: &RoutingDefinition) -> Result<()> {
        let cf_routings = self.cf(cf::ROUTINGS)?;
        let cf_by_space = self.cf(cf::ROUTINGS_BY_SPACE)?;

        let value = Self::serialize(routing)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_routings, keys::routing_key(&routing.routing_id), &value);
        batch.put_cf(
            &cf_by_space,
            keys::space_routing_key(&routing.space_id, &routing.routing_id),
            [],
        );
        self.db.write(batch)?;

        Ok(())
    }

    fn get_routing(&self, routing_id: &RoutingId) -> Result<Option<RoutingDefinition>> {
        self.get_value(cf::ROUTINGS, &keys::routing_key(routing_id))
    }

    fn delete_routing(&self, routing_id: &RoutingId) -> Result<()> {
        let cf_routings = self.cf(cf::ROUTINGS)?;
        let cf_by_space = self.cf(cf::ROUTINGS_BY_SPACE)?;

        let routing = self.get_routing(routing_id)?.ok_or(StoreError::NotFound)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(&cf_routings, keys::routing_key(routing_id));
        batch.delete_cf(
            &cf_by_space,
            keys::space_routing_key(&routing.space_id, routing_id),
        );
        self.db.write(batch)?;

        Ok(())
    }

    fn list_routings_by_space(&self, space_id: &SpaceId) -> Result<Vec<RoutingDefinition>> {
        let mut routings = Vec::new();

        for (key, _) in self.scan_prefix(cf::ROUTINGS_BY_SPACE, &keys::space_prefix(space_id))? {
            let routing_id = keys::extract_routing_id(&key)
                .ok_or(StoreError::CorruptKey(cf::ROUTINGS_BY_SPACE))?;
            if let Some(routing) = self.get_routing(&routing_id)? {
                routings.push(routing);
            }
        }

        Ok(routings)
    }

    // =========================================================================
    // Active Routing Operations
    // =========================================================================

    fn put_active_routing(&self, active: &ActiveRouting) -> Result<()> {
        let cf = self.cf(cf::ACTIVE_ROUTINGS)?;
        let value = Self::serialize(active)?;
        self.db
            .put_cf(&cf, keys::active_routing_key(&active.space_id), value)?;
        Ok(())
    }

    fn get_active_routing(&self, space_id: &SpaceId) -> Result<Option<ActiveRouting>> {
        self.get_value(cf::ACTIVE_ROUTINGS, &keys::active_routing_key(space_id))
    }

    fn delete_active_routing(&self, space_id: &SpaceId) -> Result<()> {
        let cf = self.cf(cf::ACTIVE_ROUTINGS)?;
        self.db.delete_cf(&cf, keys::active_routing_key(space_id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        ActivationState, CapabilityMap, ClimateRole, LightingRole, Role, RoutingType,
    };
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn assignment(
        space_id: SpaceId,
        device_id: DeviceId,
        channel_id: Option<ChannelId>,
        role: Role,
        priority: i32,
    ) -> RoleAssignment {
        RoleAssignment {
            space_id,
            device_id,
            channel_id,
            role,
            priority,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn role_crud() {
        let (store, _dir) = create_test_store();
        let space_id = SpaceId::generate();
        let device_id = DeviceId::generate();
        let channel_id = ChannelId::generate();

        let role = assignment(
            space_id,
            device_id,
            Some(channel_id),
            Role::Lighting(LightingRole::Main),
            0,
        );
        store.put_role(&role).unwrap();

        let fetched = store
            .get_role(&space_id, RoleDomain::Lighting, &device_id, Some(&channel_id))
            .unwrap()
            .unwrap();
        assert_eq!(fetched.role, Role::Lighting(LightingRole::Main));

        // Overwrite keeps a single record
        let updated = RoleAssignment {
            role: Role::Lighting(LightingRole::Task),
            ..role
        };
        store.put_role(&updated).unwrap();
        assert_eq!(store.list_roles(&space_id, RoleDomain::Lighting).unwrap().len(), 1);

        store
            .delete_role(&space_id, RoleDomain::Lighting, &device_id, Some(&channel_id))
            .unwrap();
        assert!(store
            .get_role(&space_id, RoleDomain::Lighting, &device_id, Some(&channel_id))
            .unwrap()
            .is_none());

        let missing =
            store.delete_role(&space_id, RoleDomain::Lighting, &device_id, Some(&channel_id));
        assert!(matches!(missing, Err(StoreError::NotFound)));
    }

    #[test]
    fn list_roles_is_per_domain_and_ordered() {
        let (store, _dir) = create_test_store();
        let space_id = SpaceId::generate();

        let ambient = assignment(
            space_id,
            DeviceId::generate(),
            Some(ChannelId::generate()),
            Role::Lighting(LightingRole::Ambient),
            2,
        );
        let main = assignment(
            space_id,
            DeviceId::generate(),
            Some(ChannelId::generate()),
            Role::Lighting(LightingRole::Main),
            5,
        );
        let ambient_first = assignment(
            space_id,
            DeviceId::generate(),
            Some(ChannelId::generate()),
            Role::Lighting(LightingRole::Ambient),
            1,
        );
        let thermostat = assignment(
            space_id,
            DeviceId::generate(),
            None,
            Role::Climate(ClimateRole::Primary),
            0,
        );
        for r in [&ambient, &main, &ambient_first, &thermostat] {
            store.put_role(r).unwrap();
        }

        let lights = store.list_roles(&space_id, RoleDomain::Lighting).unwrap();
        let order: Vec<_> = lights.iter().map(|r| (r.role, r.priority)).collect();
        assert_eq!(
            order,
            vec![
                (Role::Lighting(LightingRole::Main), 5),
                (Role::Lighting(LightingRole::Ambient), 1),
                (Role::Lighting(LightingRole::Ambient), 2),
            ]
        );

        let climate = store.list_roles(&space_id, RoleDomain::Climate).unwrap();
        assert_eq!(climate.len(), 1);
        assert_eq!(climate[0].channel_id, None);
    }

    #[test]
    fn roles_cascade_by_device_channel_and_space() {
        let (store, _dir) = create_test_store();
        let space_a = SpaceId::generate();
        let space_b = SpaceId::generate();
        let device = DeviceId::generate();
        let ch1 = ChannelId::generate();
        let ch2 = ChannelId::generate();

        store
            .put_role(&assignment(space_a, device, Some(ch1), Role::Lighting(LightingRole::Main), 0))
            .unwrap();
        store
            .put_role(&assignment(space_a, device, Some(ch2), Role::Lighting(LightingRole::Night), 0))
            .unwrap();
        store
            .put_role(&assignment(space_b, device, None, Role::Climate(ClimateRole::Auxiliary), 0))
            .unwrap();
        let other_device = DeviceId::generate();
        store
            .put_role(&assignment(space_a, other_device, Some(ChannelId::generate()), Role::Lighting(LightingRole::Accent), 0))
            .unwrap();

        assert_eq!(store.delete_roles_by_channel(&device, &ch1).unwrap(), 1);
        assert_eq!(store.list_roles(&space_a, RoleDomain::Lighting).unwrap().len(), 2);

        assert_eq!(store.delete_roles_by_device(&device).unwrap(), 2);
        assert!(store.list_roles(&space_b, RoleDomain::Climate).unwrap().is_empty());
        assert_eq!(store.list_roles(&space_a, RoleDomain::Lighting).unwrap().len(), 1);

        assert_eq!(store.delete_roles_by_space(&space_a).unwrap(), 1);
        assert!(store.list_roles(&space_a, RoleDomain::Lighting).unwrap().is_empty());
        // Index entries went with the records
        assert_eq!(store.delete_roles_by_device(&other_device).unwrap(), 0);
    }

    #[test]
    fn routing_crud_and_lookup_by_type() {
        let (store, _dir) = create_test_store();
        let space_id = SpaceId::generate();

        let custom_watch = RoutingDefinition::new(space_id, RoutingType::Watch, "Cinema");
        let default_watch = RoutingDefinition {
            is_default: true,
            ..RoutingDefinition::new(space_id, RoutingType::Watch, "Watch")
        };
        let off = RoutingDefinition::new(space_id, RoutingType::Off, "Off");
        for r in [&custom_watch, &default_watch, &off] {
            store.put_routing(r).unwrap();
        }
        store
            .put_routing(&RoutingDefinition::new(SpaceId::generate(), RoutingType::Watch, "Elsewhere"))
            .unwrap();

        assert_eq!(store.list_routings_by_space(&space_id).unwrap().len(), 3);

        let found = store
            .find_routing_by_type(&space_id, RoutingType::Watch)
            .unwrap()
            .unwrap();
        assert_eq!(found.routing_id, default_watch.routing_id);
        assert!(store
            .find_routing_by_type(&space_id, RoutingType::Gaming)
            .unwrap()
            .is_none());

        store.delete_routing(&off.routing_id).unwrap();
        assert!(store.get_routing(&off.routing_id).unwrap().is_none());
        assert_eq!(store.list_routings_by_space(&space_id).unwrap().len(), 2);
    }

    #[test]
    fn endpoint_crud() {
        let (store, _dir) = create_test_store();
        let space_id = SpaceId::generate();
        let endpoint = MediaEndpoint {
            endpoint_id: EndpointId::generate(),
            space_id,
            device_id: DeviceId::generate(),
            channel_id: None,
            name: "Living room TV".into(),
            capabilities: CapabilityMap::default(),
        };

        store.put_endpoint(&endpoint).unwrap();
        assert_eq!(
            store.get_endpoint(&endpoint.endpoint_id).unwrap(),
            Some(endpoint.clone())
        );
        assert_eq!(store.list_endpoints_by_space(&space_id).unwrap().len(), 1);

        store.delete_endpoint(&endpoint.endpoint_id).unwrap();
        assert!(store.list_endpoints_by_space(&space_id).unwrap().is_empty());
        assert!(matches!(
            store.delete_endpoint(&endpoint.endpoint_id),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn active_routing_slot() {
        let (store, _dir) = create_test_store();
        let space_id = SpaceId::generate();

        assert!(store.get_active_routing(&space_id).unwrap().is_none());

        let mut slot = ActiveRouting::deactivated(space_id);
        slot.routing_id = Some(RoutingId::generate());
        slot.state = ActivationState::Active;
        store.put_active_routing(&slot).unwrap();

        let fetched = store.get_active_routing(&space_id).unwrap().unwrap();
        assert_eq!(fetched.state, ActivationState::Active);
        assert_eq!(fetched.routing_id, slot.routing_id);

        store.delete_active_routing(&space_id).unwrap();
        assert!(store.get_active_routing(&space_id).unwrap().is_none());
        // Deleting an empty slot is not an error
        store.delete_active_routing(&space_id).unwrap();
    }
}
