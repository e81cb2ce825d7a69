use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rocket::http::{Cookie, CookieJar, Status};
use rocket::outcome::Outcome;
use rocket::request::{self, FromRequest, Request};
use rocket::time::OffsetDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::data::user::User;
use crate::resp::problem::Problem;
use crate::role::Role;
use crate::security::Security;
use crate::store::StoreHandle;
use crate::util::date_time_as_unix_seconds;

pub static AUTH_COOKIE_NAME: &str = "jwt_auth";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRoleToken {
    #[serde(with = "date_time_as_unix_seconds")]
    iat: DateTime<Utc>,
    #[serde(with = "date_time_as_unix_seconds")]
    exp: DateTime<Utc>,
    pub user: Uuid,
    pub role: Role,
}

impl UserRoleToken {
    pub fn new(user: &User, security: &Security) -> UserRoleToken {
        let now = Utc::now();
        UserRoleToken {
            iat: now,
            exp: now + security.token_lifetime,
            user: user.id,
            role: user.role,
        }
    }

    pub fn encode_jwt(&self, security: &Security) -> Result<String, jsonwebtoken::errors::Error> {
        let header = Header::new(Algorithm::HS256);
        let key = EncodingKey::from_secret(&security.jwt_secret);

        encode(&header, &self, &key)
    }

    pub fn cookie(&self, security: &Security) -> Result<Cookie<'static>, jsonwebtoken::errors::Error> {
        Ok(
            Cookie::build((AUTH_COOKIE_NAME, self.encode_jwt(security)?))
                .secure(true)
                .expires(OffsetDateTime::from_unix_timestamp(self.exp.timestamp()).ok())
                .path("/")
                .http_only(true)
                .build(),
        )
    }
}

pub fn auth_problem(detail: impl ToString) -> Problem {
    Problem::new_untyped(Status::Unauthorized, "Unable to authorize user.")
        .detail(detail)
        .clone()
}

pub fn decode_token(token: &str, security: &Security) -> Result<UserRoleToken, Problem> {
    match decode::<UserRoleToken>(
        token,
        &DecodingKey::from_secret(&security.jwt_secret),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    {
        Ok(it) => {
            tracing::debug!("decoded user roles token for user: {}", it.user);
            Ok(it)
        }
        Err(e) => {
            tracing::debug!("rejected jwt: {}", e);
            Err(auth_problem("JWT was malformed or expired."))
        }
    }
}

/// Reads the token from the auth cookie, falling back to an `Authorization: Bearer` header.
pub fn extract_claims(
    cookies: &CookieJar,
    authorization: Option<&str>,
    security: &Security,
) -> Result<UserRoleToken, Problem> {
    if let Some(jwt) = cookies.get(AUTH_COOKIE_NAME) {
        tracing::debug!("extracted jwt auth from cookie");
        return decode_token(jwt.value(), security);
    }

    match authorization.and_then(|it| it.strip_prefix("Bearer ")) {
        Some(token) => {
            tracing::debug!("extracted jwt auth from authorization header");
            decode_token(token.trim(), security)
        }
        None => Err(auth_problem("No JWT auth cookie or bearer token.")),
    }
}

fn missing_state(what: &str) -> Problem {
    Problem::new_untyped(Status::InternalServerError, "Server is misconfigured.")
        .detail(format!("{} isn't managed", what))
        .clone()
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for UserRoleToken {
    type Error = Problem;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let security = match req.rocket().state::<Security>() {
            Some(it) => it,
            None => {
                return Outcome::Error((Status::InternalServerError, missing_state("Security")))
            }
        };

        tracing::trace!("extracting user roles token from request");
        match extract_claims(
            req.cookies(),
            req.headers().get_one("Authorization"),
            security,
        ) {
            Ok(claims) => Outcome::Success(claims),
            Err(e) => {
                tracing::debug!("unable to extract claims from request");
                Outcome::Error((Status::Unauthorized, e))
            }
        }
    }
}

/// The signed-in user, freshly loaded from the store.
///
/// Roles are read from the stored profile rather than the token, so a role change or account
/// deletion takes effect before the token expires.
#[derive(Clone)]
pub struct CurrentUser(pub User);

impl std::fmt::Debug for CurrentUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CurrentUser:{}:{}", self.0.id, self.0.role)
    }
}

impl std::ops::Deref for CurrentUser {
    type Target = User;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for CurrentUser {
    type Error = Problem;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let token = match req.guard::<UserRoleToken>().await {
            Outcome::Success(it) => it,
            Outcome::Error(e) => return Outcome::Error(e),
            Outcome::Forward(s) => return Outcome::Forward(s),
        };

        let store = match req.rocket().state::<StoreHandle>() {
            Some(it) => it,
            None => {
                return Outcome::Error((Status::InternalServerError, missing_state("Store")))
            }
        };

        match store.get_user(token.user).await {
            Ok(Some(user)) => Outcome::Success(CurrentUser(user)),
            Ok(None) => Outcome::Error((
                Status::Unauthorized,
                auth_problem("Account no longer exists."),
            )),
            Err(e) => {
                let problem = Problem::from(e);
                Outcome::Error((problem.status, problem))
            }
        }
    }
}

pub mod doc {
    use utoipa::openapi::security::*;

    #[derive(Clone, Copy)]
    pub struct JWTAuth;

    impl From<JWTAuth> for SecurityScheme {
        fn from(_: JWTAuth) -> Self {
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            )
        }
    }

    impl utoipa::Modify for JWTAuth {
        fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
            if let Some(c) = openapi.components.as_mut() {
                c.add_security_scheme("jwt", *self)
            }
        }
    }
}
