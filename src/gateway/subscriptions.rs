use std::sync::Arc;

use tracing::debug;

use super::GatewayHandler;
use super::events::{DocTarget, DoctypeTarget, TaskTarget};
use crate::error::Result;
use crate::rooms::Room;
use crate::session::Session;

impl GatewayHandler {
    /// Joins the doctype list room iff the backend authorizes this user for
    /// the doctype. Denial is silent: no room join, nothing sent back.
    pub(crate) async fn handle_doctype_subscribe(
        &self,
        session: &Arc<Session>,
        target: DoctypeTarget,
    ) -> Result<()> {
        let authorized = self
            .backend
            .can_subscribe_doctype(&session.backend_base, &session.credential, &target.doctype)
            .await;
        if !authorized {
            return Ok(());
        }
        let room = Room::doctype(target.doctype).key(&session.site);
        self.registry.join(&room, &session.socket_id);
        debug!(socket_id = %session.socket_id, room = %room, "joined");
        Ok(())
    }

    // Leaving never requires authorization.
    pub(crate) fn handle_doctype_unsubscribe(
        &self,
        session: &Arc<Session>,
        target: &DoctypeTarget,
    ) {
        let room = Room::doctype(target.doctype.as_str()).key(&session.site);
        self.registry.leave(&room, &session.socket_id);
        debug!(socket_id = %session.socket_id, room = %room, "left");
    }

    /// Progress streams are not gated: holding a task id is taken as
    /// sufficient to watch that task's progress.
    pub(crate) fn handle_task_subscribe(&self, session: &Arc<Session>, target: &TaskTarget) {
        let room = Room::task_progress(target.task_id.as_str()).key(&session.site);
        self.registry.join(&room, &session.socket_id);
        debug!(socket_id = %session.socket_id, room = %room, "joined");
    }

    pub(crate) fn handle_task_unsubscribe(&self, session: &Arc<Session>, target: &TaskTarget) {
        let room = Room::task_progress(target.task_id.as_str()).key(&session.site);
        self.registry.leave(&room, &session.socket_id);
        debug!(socket_id = %session.socket_id, room = %room, "left");
    }

    pub(crate) async fn handle_doc_subscribe(
        &self,
        session: &Arc<Session>,
        target: DocTarget,
    ) -> Result<()> {
        if !self.authorize_doc(session, &target).await {
            return Ok(());
        }
        let room = Room::doc(target.doctype, target.docname).key(&session.site);
        self.registry.join(&room, &session.socket_id);
        debug!(socket_id = %session.socket_id, room = %room, "joined");
        Ok(())
    }

    pub(crate) fn handle_doc_unsubscribe(&self, session: &Arc<Session>, target: &DocTarget) {
        let room = Room::doc(target.doctype.as_str(), target.docname.as_str()).key(&session.site);
        self.registry.leave(&room, &session.socket_id);
        debug!(socket_id = %session.socket_id, room = %room, "left");
    }

    /// Open is subscribe plus presence: join the `open_doc` room, record the
    /// document so disconnect can retract it, then push the viewer list to
    /// everyone in the room. Gated by the same check as `doc_subscribe`.
    pub(crate) async fn handle_doc_open(
        &self,
        session: &Arc<Session>,
        target: DocTarget,
    ) -> Result<()> {
        if !self.authorize_doc(session, &target).await {
            return Ok(());
        }
        let room =
            Room::open_doc(target.doctype.as_str(), target.docname.as_str()).key(&session.site);
        self.registry.join(&room, &session.socket_id);
        session.track_open_doc(&target);
        debug!(socket_id = %session.socket_id, room = %room, "opened");
        self.notify_doc_viewers(session, &target);
        Ok(())
    }

    pub(crate) fn handle_doc_close(&self, session: &Arc<Session>, target: &DocTarget) {
        let room =
            Room::open_doc(target.doctype.as_str(), target.docname.as_str()).key(&session.site);
        self.registry.leave(&room, &session.socket_id);
        session.untrack_open_doc(target);
        debug!(socket_id = %session.socket_id, room = %room, "closed");
        self.notify_doc_viewers(session, target);
    }

    async fn authorize_doc(&self, session: &Session, target: &DocTarget) -> bool {
        self.backend
            .can_subscribe_doc(
                &session.backend_base,
                &session.credential,
                &target.doctype,
                &target.docname,
            )
            .await
    }
}
