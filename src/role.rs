use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Instructor,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Student, Role::Instructor, Role::Admin];

    /// Indicates whether user with role can create and edit courses
    pub fn can_author(self) -> bool {
        self >= Role::Instructor
    }

    pub fn is_admin(self) -> bool {
        self == Role::Admin
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Student
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Student => write!(f, "student"),
            Role::Instructor => write!(f, "instructor"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "instructor" => Ok(Role::Instructor),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

impl<'v> rocket::form::FromFormField<'v> for Role {
    fn from_value(field: rocket::form::ValueField<'v>) -> rocket::form::Result<'v, Self> {
        Role::from_str(field.value)
            .map_err(|e| rocket::form::Error::validation(e).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_instructors_and_admins_author() {
        assert!(!Role::Student.can_author());
        assert!(Role::Instructor.can_author());
        assert!(Role::Admin.can_author());
    }

    #[test]
    fn parses_and_displays_lowercase() {
        for role in Role::ALL {
            assert_eq!(role.to_string().parse::<Role>(), Ok(role));
        }
        assert_eq!("ADMIN".parse::<Role>(), Ok(Role::Admin));
        assert!("teacher".parse::<Role>().is_err());
    }
}
