use super::ConnectionRegistry;
use crate::ws::protocol::{encode_event, ServerEvent};

/// Broadcast an event to every connection of every online user.
/// Best effort: send results are discarded, a dead connection never
/// blocks delivery to the rest.
pub fn broadcast_to_all(registry: &ConnectionRegistry, event: &ServerEvent) {
    let Some(msg) = encode_event(event) else {
        return;
    };

    for user_id in registry.online_users() {
        for sender in registry.connections_for(&user_id) {
            let _ = sender.send(msg.clone());
        }
    }
}

/// Send an event to a specific user (all their connections). Best effort.
pub fn send_to_user(registry: &ConnectionRegistry, user_id: &str, event: &ServerEvent) {
    let Some(msg) = encode_event(event) else {
        return;
    };

    for sender in registry.connections_for(user_id) {
        let _ = sender.send(msg.clone());
    }
}
