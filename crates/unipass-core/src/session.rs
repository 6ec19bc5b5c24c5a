use crate::CkbAddress;
use serde::Serialize;

/// Result of a successful login, kept in memory only
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Session {
    pub address: Option<CkbAddress>,
    pub email: Option<String>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.address.is_some()
    }
}
