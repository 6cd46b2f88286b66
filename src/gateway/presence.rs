use tracing::debug;

use super::GatewayHandler;
use super::events::DocTarget;
use crate::protocol::messages::EventMessage;
use crate::rooms::Room;
use crate::session::Session;

impl GatewayHandler {
    /// Recomputes and broadcasts the viewer list for one document from the
    /// current `open_doc` room membership. Users are deduplicated preserving
    /// first-seen order, so a user with several tabs open counts once. When
    /// the only viewer left is the user whose action triggered the
    /// recomputation, the broadcast is suppressed.
    pub fn notify_doc_viewers(&self, session: &Session, target: &DocTarget) {
        let room =
            Room::open_doc(target.doctype.as_str(), target.docname.as_str()).key(&session.site);
        let mut users: Vec<String> = Vec::new();
        for member in self.registry.members_of(&room) {
            if !users.contains(&member.user) {
                users.push(member.user.clone());
            }
        }
        if users.len() == 1 && users[0] == session.user {
            return;
        }
        let message = EventMessage::doc_viewers(&target.doctype, &target.docname, users);
        let delivered = self.registry.send_to_room(&room, &message);
        debug!(room = %room, delivered, "presence update");
    }
}
