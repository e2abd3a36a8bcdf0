use serde::{Deserialize, Serialize};

use crate::accounts::model::{Counterpart, Role};

#[derive(Debug, Deserialize)]
pub struct LinkPatientRequest {
    pub patient_username: String,
}

#[derive(Debug, Deserialize)]
pub struct AttachCompanionRequest {
    pub companion_username: String,
}

/// Response of `GET /links/`.
#[derive(Debug, Serialize)]
pub struct LinksResponse {
    pub role: Role,
    pub linked: Vec<Counterpart>,
}

#[derive(Debug, Serialize)]
pub struct LinkedResponse {
    pub success: bool,
    pub linked: Counterpart,
}
