//! Activation planning.
//!
//! A plan is the ordered list of property writes that brings a space's media
//! devices into the state a routing describes. Only capabilities an endpoint
//! actually advertises produce steps.

use serde::Serialize;
use spaces_core::{ChannelId, DeviceCategory, DeviceId, EndpointId, PropertyId, PropertyValue, RoutingId, SpaceId};
use spaces_store::{MediaEndpoint, PowerPolicy, RoutingDefinition, RoutingType, Store};

use crate::error::{OrchestratorError, Result};

/// What a step changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Power on or off.
    Power,
    /// Select the display input.
    DisplayInput,
    /// Select the audio input.
    AudioInput,
    /// Set the volume.
    Volume,
}

impl StepKind {
    /// Whether the step selects an input.
    #[must_use]
    pub const fn is_input(self) -> bool {
        matches!(self, Self::DisplayInput | Self::AudioInput)
    }
}

/// A single planned property write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanStep {
    /// Position in the plan.
    pub order: usize,
    /// What the step changes.
    pub kind: StepKind,
    /// Endpoint the step belongs to.
    pub endpoint_id: EndpointId,
    /// Device to write.
    pub device_id: DeviceId,
    /// Channel holding the property, when known.
    pub channel_id: Option<ChannelId>,
    /// Property to write.
    pub property_id: PropertyId,
    /// Value to write.
    pub value: PropertyValue,
    /// Whether a failure aborts the rest of the plan.
    pub critical: bool,
    /// Human-readable description.
    pub description: String,
}

/// Ordered steps for activating a routing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivationPlan {
    /// Routing being activated.
    pub routing_id: RoutingId,
    /// Owning space.
    pub space_id: SpaceId,
    /// Routing type.
    pub routing_type: RoutingType,
    /// Steps in execution order.
    pub steps: Vec<PlanStep>,
    /// Number of steps.
    pub total_steps: usize,
    /// Number of critical steps.
    pub critical_steps: usize,
}

/// Load the routing's endpoints and plan its activation.
///
/// # Errors
///
/// Returns `OrchestratorError::EndpointNotFound` if the routing references a
/// missing endpoint, or a store error.
pub fn build_plan<S: Store>(store: &S, routing: &RoutingDefinition) -> Result<ActivationPlan> {
    let endpoints = routing
        .endpoint_ids()
        .into_iter()
        .map(|id| {
            store
                .get_endpoint(&id)?
                .ok_or(OrchestratorError::EndpointNotFound(id))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(plan_steps(routing, &endpoints))
}

/// Plan steps for `endpoints`, which must be in routing slot order.
///
/// Per endpoint: power, then display input, then audio input, then volume.
/// Powering off never selects inputs or sets volume.
#[must_use]
pub fn plan_steps(routing: &RoutingDefinition, endpoints: &[MediaEndpoint]) -> ActivationPlan {
    let mut steps = Vec::new();

    for endpoint in endpoints {
        let caps = &endpoint.capabilities;
        let mut push = |kind, mapping: spaces_store::CapabilityMapping, value: PropertyValue, critical, description| {
            steps.push(PlanStep {
                order: steps.len(),
                kind,
                endpoint_id: endpoint.endpoint_id,
                device_id: endpoint.device_id,
                channel_id: mapping.channel_id.or(endpoint.channel_id),
                property_id: mapping.property_id,
                value,
                critical,
                description,
            });
        };

        if let Some(power) = caps.power {
            let on = match routing.power_policy {
                PowerPolicy::On => Some(true),
                PowerPolicy::Off => Some(false),
                PowerPolicy::Unchanged => None,
            };
            if let Some(on) = on {
                let verb = if on { "Power on" } else { "Power off" };
                push(StepKind::Power, power, on.into(), true, format!("{verb} {}", endpoint.name));
            }
        }

        if routing.power_policy == PowerPolicy::Off {
            continue;
        }

        let is_display = routing.display_endpoint_id == Some(endpoint.endpoint_id);
        let is_audio = routing.audio_endpoint_id == Some(endpoint.endpoint_id);

        if let (true, Some(input), Some(mapping)) = (is_display, &routing.display_input, caps.input) {
            push(
                StepKind::DisplayInput,
                mapping,
                input.as_str().into(),
                false,
                format!("Set display input to {input}"),
            );
        }
        if let (true, Some(input), Some(mapping)) = (is_audio, &routing.audio_input, caps.input) {
            push(
                StepKind::AudioInput,
                mapping,
                input.as_str().into(),
                false,
                format!("Set audio input to {input}"),
            );
        }
        if let (true, Some(volume), Some(mapping)) = (is_audio, routing.audio_volume_preset, caps.volume) {
            let volume = volume.min(100);
            push(
                StepKind::Volume,
                mapping,
                volume.into(),
                false,
                format!("Set volume to {volume}%"),
            );
        }
    }

    let critical_steps = steps.iter().filter(|s| s.critical).count();
    ActivationPlan {
        routing_id: routing.routing_id,
        space_id: routing.space_id,
        routing_type: routing.routing_type,
        total_steps: steps.len(),
        critical_steps,
        steps,
    }
}

// =============================================================================
// Defaults
// =============================================================================

/// Build the default routing of `routing_type` from the endpoints of a space.
///
/// `endpoints` pairs every endpoint with its device category. Televisions
/// are displays, speakers and receivers are audio outputs (a television
/// serves when there is none), media players are sources.
#[must_use]
pub fn default_routing(
    space_id: SpaceId,
    routing_type: RoutingType,
    endpoints: &[(MediaEndpoint, DeviceCategory)],
) -> RoutingDefinition {
    let first = |categories: &[DeviceCategory]| {
        endpoints
            .iter()
            .find(|(_, category)| categories.contains(category))
            .map(|(endpoint, _)| endpoint.endpoint_id)
    };
    let display = first(&[DeviceCategory::Television]);
    let audio = first(&[DeviceCategory::Speaker, DeviceCategory::AvReceiver]).or(display);
    let source = first(&[DeviceCategory::MediaPlayer]);

    let mut routing = RoutingDefinition::new(space_id, routing_type, routing_type.label());
    routing.is_default = true;

    match routing_type {
        RoutingType::Listen => {
            routing.audio_endpoint_id = audio;
            routing.source_endpoint_id = source;
            routing.audio_volume_preset = Some(40);
        }
        RoutingType::Off => {
            routing.display_endpoint_id = display;
            routing.audio_endpoint_id = audio;
            routing.source_endpoint_id = source;
            routing.power_policy = PowerPolicy::Off;
        }
        RoutingType::Watch | RoutingType::Gaming | RoutingType::Background | RoutingType::Custom => {
            routing.display_endpoint_id = display;
            routing.audio_endpoint_id = audio;
            routing.source_endpoint_id = source;
            routing.audio_volume_preset = Some(30);
        }
    }

    routing
}

#[cfg(test)]
mod tests {
    use super::*;
    use spaces_store::{CapabilityMap, CapabilityMapping, RocksStore};
    use tempfile::TempDir;

    fn endpoint(space_id: SpaceId, name: &str, power: bool, input: bool, volume: bool) -> MediaEndpoint {
        let mapping = |present: bool| {
            present.then(|| CapabilityMapping {
                channel_id: None,
                property_id: PropertyId::generate(),
            })
        };
        MediaEndpoint {
            endpoint_id: EndpointId::generate(),
            space_id,
            device_id: DeviceId::generate(),
            channel_id: Some(ChannelId::generate()),
            name: name.into(),
            capabilities: CapabilityMap {
                power: mapping(power),
                input: mapping(input),
                volume: mapping(volume),
            },
        }
    }

    fn watch(space_id: SpaceId, tv: &MediaEndpoint, soundbar: &MediaEndpoint) -> RoutingDefinition {
        let mut routing = RoutingDefinition::new(space_id, RoutingType::Watch, "Watch");
        routing.display_endpoint_id = Some(tv.endpoint_id);
        routing.audio_endpoint_id = Some(soundbar.endpoint_id);
        routing.display_input = Some("hdmi1".into());
        routing.audio_volume_preset = Some(30);
        routing
    }

    #[test]
    fn steps_follow_endpoint_then_kind_order() {
        let space = SpaceId::generate();
        let tv = endpoint(space, "TV", true, true, true);
        let soundbar = endpoint(space, "Soundbar", true, false, true);
        let routing = watch(space, &tv, &soundbar);

        let plan = plan_steps(&routing, &[tv.clone(), soundbar.clone()]);
        let kinds: Vec<_> = plan.steps.iter().map(|s| (s.order, s.kind)).collect();

        assert_eq!(
            kinds,
            vec![
                (0, StepKind::Power),
                (1, StepKind::DisplayInput),
                (2, StepKind::Power),
                (3, StepKind::Volume),
            ]
        );
        assert_eq!(plan.total_steps, 4);
        assert_eq!(plan.critical_steps, 2);
        assert_eq!(plan.steps[0].description, "Power on TV");
        assert_eq!(plan.steps[1].description, "Set display input to hdmi1");
        assert_eq!(plan.steps[3].description, "Set volume to 30%");
        // Capability without a channel falls back to the endpoint channel
        assert_eq!(plan.steps[0].channel_id, tv.channel_id);
    }

    #[test]
    fn unadvertised_capabilities_produce_no_steps() {
        let space = SpaceId::generate();
        let tv = endpoint(space, "TV", false, false, false);
        let soundbar = endpoint(space, "Soundbar", false, false, false);
        let plan = plan_steps(&watch(space, &tv, &soundbar), &[tv, soundbar]);
        assert!(plan.steps.is_empty());
    }

    #[test]
    fn power_off_skips_inputs_and_volume() {
        let space = SpaceId::generate();
        let tv = endpoint(space, "TV", true, true, true);
        let soundbar = endpoint(space, "Soundbar", true, true, true);
        let mut routing = watch(space, &tv, &soundbar);
        routing.power_policy = PowerPolicy::Off;

        let plan = plan_steps(&routing, &[tv, soundbar]);
        assert!(plan.steps.iter().all(|s| s.kind == StepKind::Power));
        assert_eq!(plan.steps[0].value, PropertyValue::Bool(false));
        assert_eq!(plan.steps[0].description, "Power off TV");
    }

    #[test]
    fn unchanged_power_has_no_critical_steps() {
        let space = SpaceId::generate();
        let tv = endpoint(space, "TV", true, true, false);
        let soundbar = endpoint(space, "Soundbar", true, false, true);
        let mut routing = watch(space, &tv, &soundbar);
        routing.power_policy = PowerPolicy::Unchanged;

        let plan = plan_steps(&routing, &[tv, soundbar]);
        assert_eq!(plan.critical_steps, 0);
        assert_eq!(plan.total_steps, 2);
    }

    #[test]
    fn missing_endpoint_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        let space = SpaceId::generate();
        let tv = endpoint(space, "TV", true, false, false);
        let soundbar = endpoint(space, "Soundbar", true, false, false);
        store.put_endpoint(&tv).unwrap();

        let err = build_plan(&store, &watch(space, &tv, &soundbar)).unwrap_err();
        assert!(matches!(err, OrchestratorError::EndpointNotFound(id) if id == soundbar.endpoint_id));
    }

    #[test]
    fn defaults_pick_endpoints_by_category() {
        let space = SpaceId::generate();
        let tv = endpoint(space, "TV", true, true, true);
        let player = endpoint(space, "Player", true, false, false);
        let endpoints = vec![
            (tv.clone(), DeviceCategory::Television),
            (player.clone(), DeviceCategory::MediaPlayer),
        ];

        let watch = default_routing(space, RoutingType::Watch, &endpoints);
        assert!(watch.is_default);
        assert_eq!(watch.display_endpoint_id, Some(tv.endpoint_id));
        // No speaker, the television carries audio
        assert_eq!(watch.audio_endpoint_id, Some(tv.endpoint_id));
        assert_eq!(watch.source_endpoint_id, Some(player.endpoint_id));
        assert_eq!(watch.audio_volume_preset, Some(30));
        assert_eq!(watch.power_policy, PowerPolicy::On);

        let listen = default_routing(space, RoutingType::Listen, &endpoints);
        assert_eq!(listen.display_endpoint_id, None);
        assert_eq!(listen.audio_volume_preset, Some(40));

        let off = default_routing(space, RoutingType::Off, &endpoints);
        assert_eq!(off.power_policy, PowerPolicy::Off);
        assert_eq!(off.name, "Off");
    }
}
