use super::error::ValidationError;
use super::order::Department;
use super::utils;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    #[n(0)]
    Admin,
    #[n(1)]
    Member,
}

// Key is the user id. Only read to evaluate permission rules.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct User {
    #[n(0)]
    pub id: String, // bech32 encoded uuid7, hrp "user_"
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub email: String,
    #[n(3)]
    pub department: Department,
    #[n(4)]
    pub role: Role,
}

impl User {
    pub fn new(
        name: &str,
        email: &str,
        department: Department,
        role: Role,
    ) -> anyhow::Result<Self> {
        if name.trim().is_empty() {
            return Err(ValidationError::MissingField("name").into());
        }
        if email.trim().is_empty() {
            return Err(ValidationError::MissingField("email").into());
        }

        Ok(Self {
            id: utils::new_uuid_to_bech32("user_")?,
            name: name.trim().to_string(),
            email: email.trim().to_string(),
            department,
            role,
        })
    }

    /// Admin by role or by department; both see everything.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin || self.department == Department::Admin
    }
}
