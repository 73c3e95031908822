//! Service counters exposed through a prometheus-client registry.

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::registry::Registry;

/// Counters shared by the editor and binder. Cloning shares the underlying values.
#[derive(Debug, Clone, Default)]
pub struct EditorMetrics {
    pub batch_saves: Counter,
    pub version_bumps: Counter,
    pub edit_conflicts: Counter,
    pub consistency_errors: Counter,
}

impl EditorMetrics {
    /// Creates the counters and registers them under the `formkeep` prefix.
    pub fn register(registry: &mut Registry) -> Self {
        let metrics = Self::default();
        let sub = registry.sub_registry_with_prefix("formkeep");
        sub.register(
            "batch_saves",
            "Field batch saves that committed",
            metrics.batch_saves.clone(),
        );
        sub.register(
            "version_bumps",
            "Batch saves that opened a new form version",
            metrics.version_bumps.clone(),
        );
        sub.register(
            "edit_conflicts",
            "Batch saves rejected by a concurrent edit",
            metrics.edit_conflicts.clone(),
        );
        sub.register(
            "consistency_errors",
            "Past versions found without a snapshot",
            metrics.consistency_errors.clone(),
        );
        metrics
    }
}

/// Renders the registry in OpenMetrics text format.
pub fn render(registry: &Registry) -> Result<String, std::fmt::Error> {
    let mut out = String::new();
    encode(&mut out, registry)?;
    Ok(out)
}
