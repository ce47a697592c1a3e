//! Builds the `StatusMessage` served by `/postman/status` and the WS
//! `status` command.

use std::collections::BTreeMap;

use crate::config::VERSION;
use crate::network::connection::ConnectionRegistry;
use crate::protocol::StatusMessage;
use crate::topic::TopicRegistry;

/// Reports the current channel/member snapshot.
///
/// A labeled member always shows its label, masked or not: `label@ip:port`
/// unmasked, bare `label` masked. Only an unlabeled member is affected by
/// `mask_ips`, falling back to `ip:port` unmasked or `conn_N` masked, where
/// `N` is the topic's position in the snapshot (not the member's position
/// within it), mirroring the original broker's compile-time PaaS masking
/// flag as a runtime knob.
pub fn build_status(topics: &TopicRegistry, connections: &ConnectionRegistry, mask_ips: bool) -> StatusMessage {
    let mut channels = BTreeMap::new();

    for (topic_index, (topic, members)) in topics.snapshot().into_iter().enumerate() {
        let ids = members
            .iter()
            .map(|member_id| {
                let label = connections.get(member_id).and_then(|handle| handle.metadata.try_read().ok().and_then(|m| m.label.clone()));
                match label {
                    Some(label) if mask_ips => label,
                    Some(label) => format!("{label}@{member_id}"),
                    None if mask_ips => format!("conn_{topic_index}"),
                    None => member_id.clone(),
                }
            })
            .collect();
        channels.insert(topic, ids);
    }

    StatusMessage { version: VERSION.to_string(), channels }
}
