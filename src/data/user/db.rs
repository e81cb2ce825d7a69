use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::resp::problem::Problem;
use crate::role::Role;

use super::user_id_for;

pub mod problem {
    use crate::resp::problem::Problem;
    use rocket::http::Status;
    use uuid::Uuid;

    #[inline]
    pub fn bad_email(email: impl ToString, detail: impl ToString) -> Problem {
        Problem::new_untyped(Status::BadRequest, "Bad email.")
            .insert_str("email", email)
            .detail(detail)
            .to_owned()
    }

    #[inline]
    pub fn bad_display_name(detail: impl ToString) -> Problem {
        Problem::new_untyped(Status::BadRequest, "Bad display name.")
            .detail(detail)
            .to_owned()
    }

    #[inline]
    pub fn bad_password(detail: impl ToString) -> Problem {
        Problem::new_untyped(Status::BadRequest, "Bad password.")
            .detail(detail)
            .to_owned()
    }

    #[inline]
    pub fn not_found(id: Uuid) -> Problem {
        Problem::new_untyped(Status::NotFound, "User doesn't exist.")
            .insert("id", id.to_string())
            .clone()
    }

    #[inline]
    pub fn bad_login() -> Problem {
        Problem::new_untyped(Status::Unauthorized, "Bad email or password.")
    }
}

#[derive(Clone, FromForm, Deserialize, ToSchema)]
pub struct UserSignupData {
    #[schema(format = "email")]
    pub email: String,
    #[field(default = String::new())]
    #[serde(default)]
    pub display_name: String,
    #[schema(format = "password")]
    pub password: String,
}

impl UserSignupData {
    pub fn id(&self) -> Uuid {
        user_id_for(&self.email)
    }

    pub fn validate(&self) -> Result<(), Problem> {
        validate_email(&self.email)?;
        validate_display_name(&self.display_name)?;

        if self.password.len() < 8 {
            return Err(problem::bad_password(
                "Password must be at least 8 characters (bytes) long.",
            ));
        }

        // bcrypt only reads the first 72 bytes of its input
        if self.password.len() > 72 {
            return Err(problem::bad_password(
                "Passwords longer than 72 characters aren't supported.",
            ));
        }

        Ok(())
    }
}

impl std::fmt::Debug for UserSignupData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UserSignupData:{}", self.email)
    }
}

fn validate_email(email: &str) -> Result<(), Problem> {
    let email = email.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    };

    if !valid {
        return Err(problem::bad_email(email, "Not a valid e-mail address."));
    }

    if email.len() > 254 {
        return Err(problem::bad_email(email, "E-mail address is too long."));
    }

    Ok(())
}

fn validate_display_name(name: &str) -> Result<(), Problem> {
    if name.len() > 64 {
        return Err(problem::bad_display_name(
            "Display name can't be longer than 64 characters (bytes).",
        ));
    }
    Ok(())
}

#[derive(Clone, FromForm, Deserialize, ToSchema)]
pub struct UserLoginData {
    #[schema(format = "email")]
    pub email: String,
    #[schema(format = "password")]
    pub password: String,
}

impl std::fmt::Debug for UserLoginData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UserLoginData:{}", self.email)
    }
}

impl UserLoginData {
    pub fn validate(&self) -> Result<(), Problem> {
        if validate_email(&self.email).is_err()
            || self.password.len() < 8
            || self.password.len() > 72
        {
            return Err(problem::bad_login());
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
}

impl ProfileUpdate {
    pub fn validate(&self) -> Result<(), Problem> {
        match &self.display_name {
            Some(name) => validate_display_name(name),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RoleChange {
    pub role: Role,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LessonCompletion {
    #[serde(default = "completed_default")]
    pub completed: bool,
}

fn completed_default() -> bool {
    true
}

/// Admin user search. All given predicates must hold.
#[derive(Debug, Clone, Default, FromForm, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserQuery {
    /// Matched against e-mail and display name, case-insensitively.
    pub search: Option<String>,
    pub role: Option<Role>,
}

impl UserQuery {
    pub fn matches(&self, user: &super::User) -> bool {
        let role_matches = self.role.map(|role| user.role == role).unwrap_or(true);
        let search_matches = match self.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => {
                let term = term.to_lowercase();
                user.email.to_lowercase().contains(&term)
                    || user.display_name.to_lowercase().contains(&term)
            }
            _ => true,
        };
        role_matches && search_matches
    }
}
