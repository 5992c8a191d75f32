//! Middleware stack: bearer authentication and the per-request isolation
//! wrapper.
//!
//! The wrapper owns the whole transaction lifecycle for tenant-scoped
//! routes: begin, resolve tenant, bind the RLS session variable, run the
//! handler inside the bound context, then commit or roll back based on the
//! response status. Handlers never see the transaction directly; they reach
//! it through the task-local context.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use sqlx::PgPool;

use mercora_auth::ClaimsValidator;
use mercora_infra::directory::PgTenantDirectory;
use mercora_infra::session::{begin_request, bind_tenant, commit, rollback, tx_conn};
use mercora_tenancy::{
    BoundContext, RequestFacts, Resolution, TENANT_HEADER, is_tenant_scoped, resolve_tenant,
};

use crate::app::errors::{domain_error_to_response, json_error};
use crate::context::{ActiveTokens, Identity, TenantContext};

#[derive(Clone)]
pub struct AuthState {
    pub validator: Arc<dyn ClaimsValidator>,
}

/// Decode a bearer token when one is present. Public routes carry none and
/// pass through; a token that is present but invalid is always a 401,
/// never silently downgraded to anonymous.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    match extract_bearer(req.headers()) {
        Some(Ok(token)) => match state.validator.validate(token, Utc::now()) {
            Ok(claims) => {
                req.extensions_mut().insert(Identity::from(claims));
            }
            Err(e) => {
                return json_error(StatusCode::UNAUTHORIZED, "invalid_token", e.to_string());
            }
        },
        Some(Err(response)) => return response,
        None => {}
    }

    next.run(req).await
}

fn extract_bearer(headers: &HeaderMap) -> Option<Result<&str, Response>> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;

    let header = match header.to_str() {
        Ok(h) => h,
        Err(_) => {
            return Some(Err(json_error(
                StatusCode::UNAUTHORIZED,
                "invalid_token",
                "authorization header is not valid text",
            )));
        }
    };

    let Some(token) = header.strip_prefix("Bearer ") else {
        return Some(Err(json_error(
            StatusCode::UNAUTHORIZED,
            "invalid_token",
            "authorization header must use the Bearer scheme",
        )));
    };

    let token = token.trim();
    if token.is_empty() {
        return Some(Err(json_error(
            StatusCode::UNAUTHORIZED,
            "invalid_token",
            "empty bearer token",
        )));
    }

    Some(Ok(token))
}

#[derive(Clone)]
pub struct RlsState {
    pub pool: PgPool,
}

/// The isolation wrapper. Non-tenant routes pass straight through; nothing
/// is begun for them.
pub async fn rls_middleware(
    State(state): State<RlsState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if !is_tenant_scoped(req.uri().path()) {
        return next.run(req).await;
    }

    let facts = request_facts(&req);

    let shared = match begin_request(&state.pool).await {
        Ok(shared) => shared,
        Err(e) => return domain_error_to_response(e),
    };

    // Resolution runs inside the transaction but before any tenant variable
    // is set; directory lookups are the only statements permitted here.
    let resolution = {
        let mut guard = shared.lock().await;
        match tx_conn(&mut guard) {
            Ok(conn) => {
                let mut directory = PgTenantDirectory::new(conn);
                resolve_tenant(&facts, &mut directory).await
            }
            Err(e) => Err(e),
        }
    };

    let resolution = match resolution {
        Ok(resolution) => resolution,
        Err(e) => {
            rollback(&shared).await;
            return domain_error_to_response(e);
        }
    };

    let tenant_id = match resolution {
        Resolution::Tenant(tenant_id) => Some(tenant_id),
        Resolution::TenantWithTokens { tenant_id, tokens } => {
            req.extensions_mut().insert(ActiveTokens(tokens));
            Some(tenant_id)
        }
        // Batch lookup in which nothing resolved: the handler's result set
        // will be empty, so the request proceeds with no tenant bound.
        Resolution::NoTenant => {
            req.extensions_mut().insert(ActiveTokens::default());
            None
        }
    };

    if let Some(tenant_id) = tenant_id {
        if let Err(e) = bind_tenant(&shared, tenant_id).await {
            rollback(&shared).await;
            return domain_error_to_response(e);
        }
        req.extensions_mut().insert(TenantContext::new(tenant_id));
    }

    let ctx = BoundContext::new(tenant_id, Arc::clone(&shared));
    let response = ctx.scope(next.run(req)).await;

    if response.status().is_client_error() || response.status().is_server_error() {
        rollback(&shared).await;
        return response;
    }
    if let Err(e) = commit(&shared).await {
        return domain_error_to_response(e);
    }
    response
}

/// Project the request line into the transport-free facts the resolver
/// consumes.
fn request_facts(req: &Request<Body>) -> RequestFacts {
    let identity_tenant = req
        .extensions()
        .get::<Identity>()
        .and_then(|identity| identity.tenant_id);

    let tenant_header = req
        .headers()
        .get(TENANT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    RequestFacts {
        method: req.method().as_str().to_uppercase(),
        path: req.uri().path().to_string(),
        identity_tenant,
        tenant_header,
        query_tokens: query_tokens(req.uri().query()),
    }
}

/// Collect `token` query parameters in request order, percent-decoded.
fn query_tokens(query: Option<&str>) -> Vec<String> {
    let Some(query) = query else {
        return Vec::new();
    };
    query
        .split('&')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            if key != "token" || value.is_empty() {
                return None;
            }
            Some(match urlencoding::decode(value) {
                Ok(decoded) => decoded.into_owned(),
                Err(_) => value.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_tokens_collects_in_order() {
        let tokens = query_tokens(Some("token=a&other=x&token=b&token="));
        assert_eq!(tokens, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn query_tokens_percent_decodes() {
        let tokens = query_tokens(Some("token=a%2Bb"));
        assert_eq!(tokens, vec!["a+b".to_string()]);
    }

    #[test]
    fn no_query_means_no_tokens() {
        assert!(query_tokens(None).is_empty());
        assert!(query_tokens(Some("")).is_empty());
    }
}
