use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::authorized::{Authorized, Validate, required};

const PATIENTS: [&str; 3] = ["angajati", "medic", ""];

/// A patient record as exchanged with the backend.
///
/// Patients are keyed by their CNP, the national personal code.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Patient {
    /// The national personal code.
    #[serde(rename = "CNP")]
    pub cnp: String,
    /// Family name.
    #[serde(rename = "nume")]
    pub last_name: String,
    /// Given name.
    #[serde(rename = "prenume")]
    pub first_name: String,
    /// County of residence.
    #[serde(rename = "judet", default)]
    pub county: String,
    /// City of residence.
    #[serde(rename = "localitate", default)]
    pub city: String,
    /// Street name.
    #[serde(rename = "strada", default)]
    pub street: String,
    /// Street number.
    #[serde(rename = "nr_strada", default)]
    pub street_number: u32,
    /// Staircase, if any.
    #[serde(rename = "scara", default)]
    pub staircase: String,
    /// Apartment number.
    #[serde(rename = "apartament", default)]
    pub apartment: u32,
    /// Phone number.
    #[serde(rename = "telefon", default)]
    pub phone: String,
    /// Email address.
    #[serde(default)]
    pub email: String,
    /// Profession.
    #[serde(rename = "profesie", default)]
    pub profession: String,
    /// Employer.
    #[serde(rename = "loc_de_munca", default)]
    pub workplace: String,
    /// Sex as recorded at admission.
    #[serde(default)]
    pub sex: String,
    /// Blood group, one of `A`, `B`, `AB` or `O`.
    #[serde(rename = "grupa_sange", default)]
    pub blood_type: String,
    /// Rh factor, `pozitiv` or `negativ`.
    #[serde(default)]
    pub rh: String,
    /// The identifier of the assigned bed.
    #[serde(rename = "id_pat", default)]
    pub bed: String,
}

impl Patient {
    /// Returns the patient's full name.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.last_name, self.first_name)
    }
}

impl Validate for Patient {
    fn validate(&self) -> crate::Result<()> {
        required("CNP", &self.cnp)?;
        required("nume", &self.last_name)?;
        required("prenume", &self.first_name)
    }
}

impl Authorized {
    /// Lists all patients.
    pub async fn list_patients(&self) -> crate::Result<Vec<Patient>> {
        self.get_json(&PATIENTS).await
    }

    /// Admits a new patient.
    pub async fn create_patient(&self, patient: &Patient) -> crate::Result<()> {
        patient.validate()?;
        let _permit = self.begin(Action::CreatePatient)?;

        let request = self.request(reqwest::Method::POST, &PATIENTS)?.json(patient);
        self.send(request).await?;
        tracing::info!(cnp = %patient.cnp, "created patient");
        Ok(())
    }

    /// Replaces the record of the patient identified by `patient.cnp`.
    pub async fn update_patient(&self, patient: &Patient) -> crate::Result<()> {
        patient.validate()?;
        let _permit = self.begin(Action::UpdatePatient)?;

        let request = self
            .request(reqwest::Method::PUT, &["angajati", "medic", patient.cnp.as_str()])?
            .json(patient);
        self.send(request).await?;
        tracing::info!(cnp = %patient.cnp, "updated patient");
        Ok(())
    }

    /// Removes the patient identified by `cnp`.
    pub async fn delete_patient(&self, cnp: &str) -> crate::Result<()> {
        required("CNP", cnp)?;
        let _permit = self.begin(Action::DeletePatient)?;

        let request = self.request(reqwest::Method::DELETE, &["angajati", "medic", cnp])?;
        self.send(request).await?;
        tracing::info!(cnp, "deleted patient");
        Ok(())
    }
}
