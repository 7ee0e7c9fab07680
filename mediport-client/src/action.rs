use std::fmt;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::Error;

/// A user-triggered operation that may have at most one request in flight.
///
/// Starting an action while the same action is still pending fails with
/// [`Error::InFlight`], mirroring a submit control that stays disabled until its request
/// completes. Different actions do not block each other.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    /// Submitting credentials.
    Login,
    /// Admitting a patient.
    CreatePatient,
    /// Editing a patient record.
    UpdatePatient,
    /// Removing a patient record.
    DeletePatient,
    /// Adding a medication to the inventory.
    CreateMedication,
    /// Writing a prescription.
    CreatePrescription,
    /// Creating a user.
    CreateUser,
}

impl Action {
    /// All actions.
    pub const ALL: [Action; 7] = [
        Action::Login,
        Action::CreatePatient,
        Action::UpdatePatient,
        Action::DeletePatient,
        Action::CreateMedication,
        Action::CreatePrescription,
        Action::CreateUser,
    ];
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Login => "login",
            Action::CreatePatient => "creating a patient",
            Action::UpdatePatient => "updating a patient",
            Action::DeletePatient => "deleting a patient",
            Action::CreateMedication => "creating a medication",
            Action::CreatePrescription => "creating a prescription",
            Action::CreateUser => "creating a user",
        })
    }
}

/// One single-permit semaphore per [`Action`].
///
/// Slots are indexed by the action's discriminant, matching the order of [`Action::ALL`].
#[derive(Debug)]
pub(crate) struct InFlight {
    slots: [Arc<Semaphore>; Action::ALL.len()],
}

impl Default for InFlight {
    fn default() -> Self {
        Self {
            slots: std::array::from_fn(|_| Arc::new(Semaphore::new(1))),
        }
    }
}

impl InFlight {
    /// Marks `action` as in flight until the returned permit is dropped.
    pub(crate) fn begin(&self, action: Action) -> crate::Result<ActionPermit> {
        let slot = Arc::clone(&self.slots[action as usize]);
        match slot.try_acquire_owned() {
            Ok(permit) => Ok(ActionPermit { _permit: permit }),
            Err(_) => {
                tracing::debug!(%action, "rejecting duplicate submission");
                Err(Error::InFlight(action))
            }
        }
    }

    #[cfg(test)]
    fn available(&self, action: Action) -> usize {
        self.slots[action as usize].available_permits()
    }
}

/// Keeps an [`Action`] marked as in flight while alive.
#[derive(Debug)]
pub(crate) struct ActionPermit {
    _permit: OwnedSemaphorePermit,
}
