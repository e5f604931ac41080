use crate::config::Config;
use crate::core::routing::ApprovalTier;
use crate::{model::role::Role, models::Claims};
use actix_web::{FromRequest, HttpRequest, dev::Payload, error::ErrorUnauthorized, web::Data};
use futures::future::{Ready, ready};
use jsonwebtoken::decode;
use jsonwebtoken::{DecodingKey, Validation};

pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,

    /// Present only if this user is linked to a student record
    pub student_id: Option<u64>,
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let token = match req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
        {
            Some(t) => t,
            None => return ready(Err(ErrorUnauthorized("Missing token"))),
        };

        let config = match req.app_data::<Data<Config>>() {
            Some(c) => c,
            None => {
                return ready(Err(actix_web::error::ErrorInternalServerError(
                    "Config missing",
                )));
            }
        };

        let data = match decode::<Claims>(
            token,
            &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            &Validation::default(),
        ) {
            Ok(d) => d,
            Err(_) => return ready(Err(ErrorUnauthorized("Invalid token"))),
        };

        let role = match Role::from_id(data.claims.role) {
            Some(r) => r,
            None => return ready(Err(ErrorUnauthorized("Invalid role"))),
        };

        ready(Ok(AuthUser {
            user_id: data.claims.user_id,
            username: data.claims.sub,
            role,
            student_id: data.claims.student_id,
        }))
    }
}

impl AuthUser {
    /// Warden-side staff allowed to browse applications and logs.
    pub fn require_staff(&self) -> actix_web::Result<()> {
        if matches!(
            self.role,
            Role::Admin | Role::Principal | Role::DeputyWarden | Role::GateStaff
        ) {
            Ok(())
        } else {
            Err(actix_web::error::ErrorForbidden("Staff only"))
        }
    }

    /// The approval tier this user decides at. Admins hold no tier;
    /// approvals stay with the named deputy warden / principal roles.
    pub fn require_tier(&self) -> actix_web::Result<ApprovalTier> {
        match self.role {
            Role::DeputyWarden => Ok(ApprovalTier::DeputyWarden),
            Role::Principal => Ok(ApprovalTier::Principal),
            _ => Err(actix_web::error::ErrorForbidden(
                "Deputy warden or principal only",
            )),
        }
    }

    pub fn require_deputy_warden(&self) -> actix_web::Result<()> {
        if self.role == Role::DeputyWarden {
            Ok(())
        } else {
            Err(actix_web::error::ErrorForbidden("Deputy warden only"))
        }
    }

    pub fn require_gate_staff(&self) -> actix_web::Result<()> {
        if matches!(self.role, Role::GateStaff | Role::Admin) {
            Ok(())
        } else {
            Err(actix_web::error::ErrorForbidden("Gate staff only"))
        }
    }

    pub fn require_guardian(&self) -> actix_web::Result<()> {
        if self.role == Role::Guardian {
            Ok(())
        } else {
            Err(actix_web::error::ErrorForbidden("Guardian only"))
        }
    }

    /// Returns true if the user is a student
    pub fn is_student(&self) -> bool {
        self.role == Role::Student
    }
}
