use actix_web::body::EitherBody;
use actix_web::dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{Error, FromRequest, HttpMessage, HttpRequest, HttpResponse};
use log::{debug, error, info, warn};
use serde_json::json;
use std::future::{ready, Future, Ready};
use std::pin::Pin;
use std::rc::Rc;
use uuid::Uuid;

use crate::errors::ApiError;
use crate::models::Role;
use crate::services::AuthService;

/// Cookie carrying the scheme-prefixed session token.
pub const AUTH_COOKIE: &str = "authorization";
pub const AUTH_SCHEME: &str = "Bearer";

/// Authenticated caller, reconstructed per request from the session cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserSession {
    pub id: Uuid,
    pub role: Role,
}

impl UserSession {
    /// The one reusable per-route authorization check: 403 unless the
    /// caller's role is in the allowed set.
    pub fn require(&self, allowed: &[Role]) -> Result<(), ApiError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Access denied".to_string()))
        }
    }
}

impl FromRequest for UserSession {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<UserSession>()
                .copied()
                .ok_or_else(|| ApiError::AuthError("Not authenticated".to_string())),
        )
    }
}

fn session_from_request(req: &ServiceRequest, secret: &str) -> Result<UserSession, ApiError> {
    let cookie = req
        .cookie(AUTH_COOKIE)
        .ok_or_else(|| ApiError::AuthError("Missing session cookie".to_string()))?;

    let token = cookie
        .value()
        .strip_prefix(AUTH_SCHEME)
        .map(|rest| rest.trim_start())
        .filter(|rest| !rest.is_empty())
        .ok_or_else(|| ApiError::AuthError("Malformed session cookie".to_string()))?;

    AuthService::verify_token(token, secret)
}

// Authorization gate: verifies the session cookie and attaches the caller's
// session to the request, or halts with 401 before any handler runs.
pub struct AuthGate {
    secret: Rc<String>,
}

impl AuthGate {
    pub fn new(secret: impl Into<String>) -> Self {
        AuthGate {
            secret: Rc::new(secret.into()),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthGate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = AuthGateMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthGateMiddleware {
            service: Rc::new(service),
            secret: self.secret.clone(),
        }))
    }
}

pub struct AuthGateMiddleware<S> {
    service: Rc<S>,
    secret: Rc<String>,
}

impl<S, B> Service<ServiceRequest> for AuthGateMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + 'static>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        match session_from_request(&req, &self.secret) {
            Ok(session) => {
                req.extensions_mut().insert(session);
                let fut = self.service.call(req);
                Box::pin(async move { fut.await.map(|res| res.map_into_left_body()) })
            }
            Err(err) => {
                debug!("Unauthenticated request to {}: {}", req.path(), err);
                Box::pin(async move {
                    Ok(req
                        .into_response(HttpResponse::Unauthorized().finish())
                        .map_into_right_body())
                })
            }
        }
    }
}

// Role gate: guards a whole scope with a declarative capability set. Must sit
// inside an AuthGate so the session is already attached.
pub struct RoleGate {
    allowed: &'static [Role],
}

impl RoleGate {
    pub fn new(allowed: &'static [Role]) -> Self {
        RoleGate { allowed }
    }

    pub fn admin_only() -> Self {
        RoleGate::new(&[Role::Admin])
    }
}

impl<S, B> Transform<S, ServiceRequest> for RoleGate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RoleGateMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RoleGateMiddleware {
            service: Rc::new(service),
            allowed: self.allowed,
        }))
    }
}

pub struct RoleGateMiddleware<S> {
    service: Rc<S>,
    allowed: &'static [Role],
}

impl<S, B> Service<ServiceRequest> for RoleGateMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + 'static>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let session = req.extensions().get::<UserSession>().copied();
        match session {
            Some(session) if self.allowed.contains(&session.role) => {
                let fut = self.service.call(req);
                Box::pin(async move { fut.await.map(|res| res.map_into_left_body()) })
            }
            Some(session) => {
                warn!(
                    "Role {} denied access to {}",
                    session.role,
                    req.path()
                );
                Box::pin(async move {
                    Ok(req
                        .into_response(
                            HttpResponse::Forbidden().json(json!({ "error": "Access denied" })),
                        )
                        .map_into_right_body())
                })
            }
            None => Box::pin(async move {
                Ok(req
                    .into_response(HttpResponse::Unauthorized().finish())
                    .map_into_right_body())
            }),
        }
    }
}

// Logger middleware to log all requests and responses
pub struct RequestLogger;

impl<S, B> Transform<S, ServiceRequest> for RequestLogger
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = RequestLoggerMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestLoggerMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct RequestLoggerMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for RequestLoggerMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + 'static>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let method = req.method().clone();
        let path = req.path().to_owned();
        let client_ip = req
            .connection_info()
            .realip_remote_addr()
            .map(|s| s.to_owned())
            .unwrap_or_else(|| String::from("unknown"));

        info!(
            "→ Request: \x1B[1;34m{} {}\x1B[0m from IP: {}",
            method, path, client_ip
        );

        let service = self.service.clone();

        Box::pin(async move {
            let start = std::time::Instant::now();
            let res = service.call(req).await?;
            let elapsed = start.elapsed();

            let status = res.status();

            if status.is_success() {
                info!(
                    "← Response: \x1B[1;32m{}\x1B[0m for {} {} completed in {:.2?}",
                    status, method, path, elapsed
                );
            } else if status.is_client_error() {
                warn!(
                    "← Response: \x1B[1;33m{}\x1B[0m for {} {} completed in {:.2?}",
                    status, method, path, elapsed
                );
            } else {
                error!(
                    "← Response: \x1B[1;31m{}\x1B[0m for {} {} completed in {:.2?}",
                    status, method, path, elapsed
                );
            }

            Ok(res)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::cookie::Cookie;
    use actix_web::http::StatusCode;
    use actix_web::{test, web, App};

    const SECRET: &str = "test-secret";

    async fn probe(session: UserSession) -> HttpResponse {
        HttpResponse::Ok().json(json!({
            "id": session.id.to_string(),
            "role": session.role,
        }))
    }

    fn session_cookie(role: Role) -> (Uuid, Cookie<'static>) {
        let id = Uuid::new_v4();
        let token = AuthService::generate_token(id, role, SECRET).unwrap();
        (
            id,
            Cookie::new(AUTH_COOKIE, format!("{} {}", AUTH_SCHEME, token)),
        )
    }

    #[actix_web::test]
    async fn gate_rejects_missing_cookie() {
        let app = test::init_service(
            App::new()
                .wrap(AuthGate::new(SECRET))
                .route("/probe", web::get().to(probe)),
        )
        .await;

        let res = test::call_service(&app, test::TestRequest::get().uri("/probe").to_request()).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn gate_rejects_garbled_cookie() {
        let app = test::init_service(
            App::new()
                .wrap(AuthGate::new(SECRET))
                .route("/probe", web::get().to(probe)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/probe")
            .cookie(Cookie::new(AUTH_COOKIE, "Bearer not.a.token"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get()
            .uri("/probe")
            .cookie(Cookie::new(AUTH_COOKIE, "missing-scheme"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn gate_rejects_token_signed_with_other_secret() {
        let app = test::init_service(
            App::new()
                .wrap(AuthGate::new(SECRET))
                .route("/probe", web::get().to(probe)),
        )
        .await;

        let token = AuthService::generate_token(Uuid::new_v4(), Role::Admin, "other").unwrap();
        let req = test::TestRequest::get()
            .uri("/probe")
            .cookie(Cookie::new(AUTH_COOKIE, format!("Bearer {}", token)))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn gate_attaches_session_for_valid_cookie() {
        let app = test::init_service(
            App::new()
                .wrap(AuthGate::new(SECRET))
                .route("/probe", web::get().to(probe)),
        )
        .await;

        let (id, cookie) = session_cookie(Role::Standard);
        let req = test::TestRequest::get().uri("/probe").cookie(cookie).to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["id"], id.to_string());
        assert_eq!(body["role"], "standard-user");
    }

    #[actix_web::test]
    async fn role_gate_blocks_non_admins() {
        let app = test::init_service(
            App::new()
                .wrap(RoleGate::admin_only())
                .wrap(AuthGate::new(SECRET))
                .route("/probe", web::get().to(probe)),
        )
        .await;

        let (_, cookie) = session_cookie(Role::ServiceDesk);
        let req = test::TestRequest::get().uri("/probe").cookie(cookie).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        let (_, cookie) = session_cookie(Role::Admin);
        let req = test::TestRequest::get().uri("/probe").cookie(cookie).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }

    #[::core::prelude::v1::test]
    fn require_checks_capability_sets() {
        let session = UserSession {
            id: Uuid::new_v4(),
            role: Role::ServiceDesk,
        };
        assert!(session.require(&[Role::ServiceDesk, Role::Admin]).is_ok());
        assert!(session.require(&[Role::Admin]).is_err());
    }
}
