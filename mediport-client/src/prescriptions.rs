use serde::{Deserialize, Serialize};

use crate::Error;
use crate::action::Action;
use crate::authorized::{Authorized, Validate, required};

const PRESCRIPTIONS: [&str; 2] = ["prescriptii", ""];

/// A prescription of a medication for a patient.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Prescription {
    /// The prescription identifier.
    #[serde(rename = "id_prescriptie", default)]
    pub id: u64,
    /// The prescribed quantity, free text such as `"2x daily"`.
    #[serde(rename = "cantitate")]
    pub quantity: String,
    /// The CNP of the patient.
    #[serde(rename = "CNP")]
    pub patient_cnp: String,
    /// The diagnosed condition.
    #[serde(rename = "afectiune", default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// The database identifier of the prescribed medication.
    #[serde(rename = "id_medicament")]
    pub medication_id: u64,
}

impl Validate for Prescription {
    fn validate(&self) -> crate::Result<()> {
        required("cantitate", &self.quantity)?;
        if self.medication_id == 0 {
            return Err(Error::Validation {
                field: "id_medicament",
            });
        }
        required("CNP", &self.patient_cnp)
    }
}

impl Authorized {
    /// Lists all prescriptions.
    pub async fn list_prescriptions(&self) -> crate::Result<Vec<Prescription>> {
        self.get_json(&PRESCRIPTIONS).await
    }

    /// Lists the prescriptions of the patient identified by `cnp`.
    ///
    /// The backend has no per-patient endpoint, so this filters the full list.
    pub async fn list_prescriptions_for(&self, cnp: &str) -> crate::Result<Vec<Prescription>> {
        let mut prescriptions = self.list_prescriptions().await?;
        prescriptions.retain(|prescription| prescription.patient_cnp == cnp);
        Ok(prescriptions)
    }

    /// Writes a new prescription.
    pub async fn create_prescription(&self, prescription: &Prescription) -> crate::Result<()> {
        prescription.validate()?;
        let _permit = self.begin(Action::CreatePrescription)?;

        let request = self
            .request(reqwest::Method::POST, &PRESCRIPTIONS)?
            .json(prescription);
        self.send(request).await?;
        tracing::info!(
            cnp = %prescription.patient_cnp,
            medication_id = prescription.medication_id,
            "created prescription"
        );
        Ok(())
    }
}
