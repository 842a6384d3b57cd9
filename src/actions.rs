use crate::error::RuleError;
use crate::rules::Action;
use crate::store::{EmailPatch, EmailRecord, RecordStore};
use tracing::{debug, warn};

const INBOX: &str = "INBOX";
const UNREAD: &str = "UNREAD";

#[derive(Debug)]
pub enum ActionResult {
    Succeeded,
    Failed(RuleError),
}

/// Apply one action to one email.
///
/// The change is written to the store first and only mirrored onto `email`
/// once the write succeeded, so the in-memory record never runs ahead of
/// what was persisted. Actions that would not change anything skip the write.
pub fn apply<S: RecordStore + ?Sized>(
    store: &mut S,
    email: &mut EmailRecord,
    action: &Action,
) -> ActionResult {
    let patch = match plan(email, action) {
        Ok(patch) => patch,
        Err(e) => {
            warn!(email_id = %email.id, action = %action, error = %e, "Action rejected");
            return ActionResult::Failed(e);
        }
    };

    if patch.is_empty() {
        debug!(email_id = %email.id, action = %action, "Action is a no-op");
        return ActionResult::Succeeded;
    }

    match store.update_email(&email.id, &patch) {
        Ok(()) => {
            email.apply_patch(&patch);
            debug!(email_id = %email.id, action = %action, "Action applied");
            ActionResult::Succeeded
        }
        Err(e) => {
            warn!(email_id = %email.id, action = %action, error = %e, "Failed to persist action");
            ActionResult::Failed(e.into())
        }
    }
}

/// Work out the patch an action implies for the email's current state.
fn plan(email: &EmailRecord, action: &Action) -> Result<EmailPatch, RuleError> {
    let mut labels = email.labels.clone();
    let is_read = match action {
        Action::MarkRead => {
            labels.retain(|l| l != UNREAD);
            Some(true)
        }
        Action::MarkUnread => {
            if !labels.iter().any(|l| l == UNREAD) {
                labels.push(UNREAD.to_string());
            }
            Some(false)
        }
        Action::Move { destination } => {
            let destination = destination.trim();
            if destination.is_empty() {
                return Err(RuleError::configuration(
                    "move action requires a destination",
                ));
            }
            if !labels.iter().any(|l| l == destination) {
                labels.push(destination.to_string());
            }
            if destination != INBOX {
                labels.retain(|l| l != INBOX);
            }
            None
        }
    };

    Ok(EmailPatch {
        is_read: is_read.filter(|&r| r != email.is_read),
        labels: (labels != email.labels).then_some(labels),
    })
}
