use serde::{Deserialize, Deserializer, Serialize};

use crate::action::Action;
use crate::authorized::{Authorized, Validate, required};

const MEDICATIONS: [&str; 3] = ["angajati", "medic", "medicamente"];

/// A medication in the inventory.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Medication {
    /// The database identifier, assigned by the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// The medication code.
    #[serde(rename = "id_medicament", deserialize_with = "string_or_number")]
    pub code: String,
    /// Commercial name.
    #[serde(rename = "denumire")]
    pub name: String,
    /// Strength, for example `500mg`.
    #[serde(rename = "concentratie", default)]
    pub concentration: String,
    /// Pharmaceutical form, for example tablets or syrup.
    #[serde(rename = "forma_farmaceutica", default)]
    pub form: String,
    /// Unit price.
    #[serde(rename = "pret", default)]
    pub price: f64,
    /// Units in stock.
    #[serde(rename = "stoc", default)]
    pub stock: u32,
    /// Whether the medication can be prescribed.
    #[serde(rename = "disponibilitate", default)]
    pub available: bool,
}

/// Accepts codes sent either as strings or as numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Code {
        String(String),
        Number(u64),
    }

    Ok(match Code::deserialize(deserializer)? {
        Code::String(code) => code,
        Code::Number(code) => code.to_string(),
    })
}

impl Validate for Medication {
    fn validate(&self) -> crate::Result<()> {
        required("id_medicament", &self.code)?;
        required("denumire", &self.name)
    }
}

impl Authorized {
    /// Lists the medication inventory.
    pub async fn list_medications(&self) -> crate::Result<Vec<Medication>> {
        self.get_json(&MEDICATIONS).await
    }

    /// Adds a medication to the inventory.
    pub async fn create_medication(&self, medication: &Medication) -> crate::Result<()> {
        medication.validate()?;
        let _permit = self.begin(Action::CreateMedication)?;

        let request = self
            .request(reqwest::Method::POST, &MEDICATIONS)?
            .json(medication);
        self.send(request).await?;
        tracing::info!(code = %medication.code, "created medication");
        Ok(())
    }
}
