//! Tenant resolution: (identity, route, tokens) → tenant.
//!
//! A pure decision procedure over the request line. Database access happens
//! only through the [`TenantDirectory`] seam, which the transaction wrapper
//! backs with plain queries on the active transaction *before* the tenant
//! session variable is set.
//!
//! Precedence, highest first:
//! 1. authenticated identity's tenant id;
//! 2. explicit `x-tenant-id` header (trusted internal calls);
//! 3. route-pattern rules over decoded path segments;
//! 4. paths outside tenant-scoped prefixes → no tenant.

use std::borrow::Cow;

use async_trait::async_trait;

use mercora_core::{DomainError, DomainResult, TenantId};

/// Header carrying an explicit tenant id on trusted internal calls.
pub const TENANT_HEADER: &str = "x-tenant-id";

/// First path segments that require a resolvable tenant.
pub const TENANT_SCOPED_PREFIXES: &[&str] =
    &["products", "orders", "customers", "availability-requests"];

/// Single segments under `/orders/` that are routes, not tenant slugs.
const RESERVED_ORDER_SEGMENTS: &[&str] = &["day-close", "tracking"];

/// Plain lookups executed inside the active transaction, before any tenant
/// variable is set. They cannot go through tenant-filtered repository access
/// themselves.
#[async_trait]
pub trait TenantDirectory: Send {
    async fn tenant_by_slug(&mut self, slug: &str) -> DomainResult<Option<TenantId>>;
    async fn tenant_by_order_token(&mut self, token: &str) -> DomainResult<Option<TenantId>>;
}

/// The facts the resolver needs from a request; transport-free so the
/// decision procedure is testable without an HTTP stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFacts {
    /// Uppercase HTTP method.
    pub method: String,
    /// Raw (undecoded) request path.
    pub path: String,
    /// Tenant id carried by the authenticated identity, if any.
    pub identity_tenant: Option<TenantId>,
    /// Raw value of the explicit tenant header, if present.
    pub tenant_header: Option<String>,
    /// `token` query parameters, in request order.
    pub query_tokens: Vec<String>,
}

/// Outcome of tenant resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Exactly one tenant governs this request.
    Tenant(TenantId),
    /// Batch token lookup: one tenant, with the active token set narrowed to
    /// the tokens that actually resolved.
    TenantWithTokens {
        tenant_id: TenantId,
        tokens: Vec<String>,
    },
    /// Isolation is not applicable (non-tenant route, or a batch lookup in
    /// which nothing resolved and the caller's result set will be empty).
    NoTenant,
}

/// What a route rule extracted from the path, before any directory lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RouteMatch {
    Slug(String),
    TrackingToken(String),
    TrackingBatch,
}

type RouteRule = fn(method: &str, segments: &[String], has_tokens: bool) -> Option<RouteMatch>;

/// Ordered route rules; the first match wins.
const ROUTE_RULES: &[RouteRule] = &[
    public_slug_rule,
    public_order_creation_rule,
    single_tracking_rule,
    batch_tracking_rule,
];

/// `GET /products/public/{slug}`, `POST /availability-requests/public/{slug}`.
fn public_slug_rule(_method: &str, segments: &[String], _has_tokens: bool) -> Option<RouteMatch> {
    match segments {
        [prefix, public, slug]
            if public == "public"
                && (prefix == "products" || prefix == "availability-requests") =>
        {
            Some(RouteMatch::Slug(slug.clone()))
        }
        _ => None,
    }
}

/// `POST /orders/{tenant_slug}` — public storefront order creation. Reserved
/// segments (day-close, tracking) are routes of their own, never slugs.
fn public_order_creation_rule(
    method: &str,
    segments: &[String],
    _has_tokens: bool,
) -> Option<RouteMatch> {
    match segments {
        [orders, slug]
            if method == "POST"
                && orders == "orders"
                && !RESERVED_ORDER_SEGMENTS.iter().any(|r| r == slug) =>
        {
            Some(RouteMatch::Slug(slug.clone()))
        }
        _ => None,
    }
}

/// `/orders/tracking/{token}` and everything beneath it: the single lookup
/// plus the customer actions keyed by the same token (order rejection,
/// per-line replacement decisions).
fn single_tracking_rule(
    _method: &str,
    segments: &[String],
    _has_tokens: bool,
) -> Option<RouteMatch> {
    match segments {
        [orders, tracking, token, ..] if orders == "orders" && tracking == "tracking" => {
            Some(RouteMatch::TrackingToken(token.clone()))
        }
        _ => None,
    }
}

/// `GET /orders/tracking?token=...` — batch tracking lookup.
fn batch_tracking_rule(method: &str, segments: &[String], has_tokens: bool) -> Option<RouteMatch> {
    match segments {
        [orders, tracking]
            if method == "GET" && orders == "orders" && tracking == "tracking" && has_tokens =>
        {
            Some(RouteMatch::TrackingBatch)
        }
        _ => None,
    }
}

/// Whether the wrapper must run for this path at all.
pub fn is_tenant_scoped(path: &str) -> bool {
    match path_segments(path).first() {
        Some(first) => TENANT_SCOPED_PREFIXES.iter().any(|p| p == first),
        None => false,
    }
}

/// Percent-decode one segment, falling back to the raw value on failure.
///
/// This is a security boundary: malformed input must degrade to a lookup
/// that simply misses, never to an error that skips isolation.
fn decode_segment(raw: &str) -> String {
    match urlencoding::decode(raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => Cow::Borrowed(raw).into_owned(),
    }
}

fn path_segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(decode_segment)
        .collect()
}

/// Resolve the tenant governing a request.
pub async fn resolve_tenant<D: TenantDirectory>(
    facts: &RequestFacts,
    directory: &mut D,
) -> DomainResult<Resolution> {
    if let Some(tenant_id) = facts.identity_tenant {
        return Ok(Resolution::Tenant(tenant_id));
    }

    // An unparsable header is ignored rather than fatal: the route rules
    // below may still resolve the request legitimately.
    if let Some(raw) = facts.tenant_header.as_deref() {
        if let Ok(tenant_id) = raw.trim().parse::<TenantId>() {
            return Ok(Resolution::Tenant(tenant_id));
        }
        tracing::debug!(header = raw, "ignoring unparsable tenant header");
    }

    let segments = path_segments(&facts.path);
    let has_tokens = !facts.query_tokens.is_empty();

    let matched = ROUTE_RULES
        .iter()
        .find_map(|rule| rule(&facts.method, &segments, has_tokens));

    match matched {
        Some(RouteMatch::Slug(slug)) => match directory.tenant_by_slug(&slug).await? {
            Some(tenant_id) => Ok(Resolution::Tenant(tenant_id)),
            None => Err(DomainError::NotFound),
        },
        Some(RouteMatch::TrackingToken(token)) => {
            match directory.tenant_by_order_token(&token).await? {
                Some(tenant_id) => Ok(Resolution::Tenant(tenant_id)),
                None => Err(DomainError::NotFound),
            }
        }
        Some(RouteMatch::TrackingBatch) => {
            resolve_batch(&facts.query_tokens, directory).await
        }
        None => {
            if is_tenant_scoped(&facts.path) {
                Err(DomainError::TenantUnresolved)
            } else {
                Ok(Resolution::NoTenant)
            }
        }
    }
}

/// Batch token resolution: dedupe, resolve each independently tolerating
/// misses, and require all hits to agree on one tenant.
///
/// Zero resolvable tokens is deliberately success-with-no-isolation: the
/// caller's own result set will be empty. Documented fail-open behavior.
async fn resolve_batch<D: TenantDirectory>(
    tokens: &[String],
    directory: &mut D,
) -> DomainResult<Resolution> {
    let mut deduped: Vec<&String> = Vec::with_capacity(tokens.len());
    for token in tokens {
        if !deduped.contains(&token) {
            deduped.push(token);
        }
    }

    let mut resolved_tenant: Option<TenantId> = None;
    let mut resolved_tokens: Vec<String> = Vec::new();

    for token in deduped {
        let Some(tenant_id) = directory.tenant_by_order_token(token).await? else {
            continue;
        };
        match resolved_tenant {
            None => resolved_tenant = Some(tenant_id),
            Some(existing) if existing != tenant_id => {
                return Err(DomainError::TenantAmbiguous);
            }
            Some(_) => {}
        }
        resolved_tokens.push(token.clone());
    }

    match resolved_tenant {
        Some(tenant_id) => Ok(Resolution::TenantWithTokens {
            tenant_id,
            tokens: resolved_tokens,
        }),
        None => Ok(Resolution::NoTenant),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeDirectory {
        slugs: HashMap<String, TenantId>,
        tokens: HashMap<String, TenantId>,
        lookups: usize,
    }

    impl FakeDirectory {
        fn new() -> Self {
            Self {
                slugs: HashMap::new(),
                tokens: HashMap::new(),
                lookups: 0,
            }
        }

        fn with_slug(mut self, slug: &str, tenant: i64) -> Self {
            self.slugs
                .insert(slug.to_string(), TenantId::from_raw(tenant).unwrap());
            self
        }

        fn with_token(mut self, token: &str, tenant: i64) -> Self {
            self.tokens
                .insert(token.to_string(), TenantId::from_raw(tenant).unwrap());
            self
        }
    }

    #[async_trait]
    impl TenantDirectory for FakeDirectory {
        async fn tenant_by_slug(&mut self, slug: &str) -> DomainResult<Option<TenantId>> {
            self.lookups += 1;
            Ok(self.slugs.get(slug).copied())
        }

        async fn tenant_by_order_token(&mut self, token: &str) -> DomainResult<Option<TenantId>> {
            self.lookups += 1;
            Ok(self.tokens.get(token).copied())
        }
    }

    fn tenant(raw: i64) -> TenantId {
        TenantId::from_raw(raw).unwrap()
    }

    fn facts(method: &str, path: &str) -> RequestFacts {
        RequestFacts {
            method: method.to_string(),
            path: path.to_string(),
            identity_tenant: None,
            tenant_header: None,
            query_tokens: vec![],
        }
    }

    #[tokio::test]
    async fn identity_tenant_wins_over_everything() {
        let mut dir = FakeDirectory::new().with_slug("corner-shop", 5);
        let mut f = facts("POST", "/orders/corner-shop");
        f.identity_tenant = Some(tenant(1));
        f.tenant_header = Some("2".to_string());

        let res = resolve_tenant(&f, &mut dir).await.unwrap();
        assert_eq!(res, Resolution::Tenant(tenant(1)));
        assert_eq!(dir.lookups, 0, "no directory lookup when identity decides");
    }

    #[tokio::test]
    async fn header_wins_over_route_rules() {
        let mut dir = FakeDirectory::new().with_slug("corner-shop", 5);
        let mut f = facts("POST", "/orders/corner-shop");
        f.tenant_header = Some("2".to_string());

        let res = resolve_tenant(&f, &mut dir).await.unwrap();
        assert_eq!(res, Resolution::Tenant(tenant(2)));
    }

    #[tokio::test]
    async fn invalid_header_falls_through_to_route_rules() {
        let mut dir = FakeDirectory::new().with_slug("corner-shop", 5);
        for bad in ["zero", "0", "-4", ""] {
            let mut f = facts("POST", "/orders/corner-shop");
            f.tenant_header = Some(bad.to_string());
            let res = resolve_tenant(&f, &mut dir).await.unwrap();
            assert_eq!(res, Resolution::Tenant(tenant(5)), "header {bad:?}");
        }
    }

    #[tokio::test]
    async fn public_product_listing_resolves_by_slug() {
        let mut dir = FakeDirectory::new().with_slug("corner-shop", 5);
        let f = facts("GET", "/products/public/corner-shop");
        let res = resolve_tenant(&f, &mut dir).await.unwrap();
        assert_eq!(res, Resolution::Tenant(tenant(5)));
    }

    #[tokio::test]
    async fn public_availability_request_resolves_by_slug() {
        let mut dir = FakeDirectory::new().with_slug("corner-shop", 5);
        let f = facts("POST", "/availability-requests/public/corner-shop");
        let res = resolve_tenant(&f, &mut dir).await.unwrap();
        assert_eq!(res, Resolution::Tenant(tenant(5)));
    }

    #[tokio::test]
    async fn unknown_slug_is_not_found() {
        let mut dir = FakeDirectory::new();
        let f = facts("POST", "/orders/ghost-shop");
        let err = resolve_tenant(&f, &mut dir).await.unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[tokio::test]
    async fn reserved_order_segments_are_not_slugs() {
        let mut dir = FakeDirectory::new().with_slug("day-close", 5);
        for reserved in ["day-close", "tracking"] {
            let f = facts("POST", &format!("/orders/{reserved}"));
            let err = resolve_tenant(&f, &mut dir).await.unwrap_err();
            assert_eq!(err, DomainError::TenantUnresolved, "segment {reserved}");
        }
    }

    #[tokio::test]
    async fn get_on_order_slug_path_is_not_public_creation() {
        // Only POST creates orders publicly; a GET with the same shape needs
        // an authenticated tenant.
        let mut dir = FakeDirectory::new().with_slug("corner-shop", 5);
        let f = facts("GET", "/orders/corner-shop");
        let err = resolve_tenant(&f, &mut dir).await.unwrap_err();
        assert_eq!(err, DomainError::TenantUnresolved);
    }

    #[tokio::test]
    async fn percent_encoded_slug_is_decoded() {
        let mut dir = FakeDirectory::new().with_slug("café corner", 8);
        let f = facts("POST", "/orders/caf%C3%A9%20corner");
        let res = resolve_tenant(&f, &mut dir).await.unwrap();
        assert_eq!(res, Resolution::Tenant(tenant(8)));
    }

    #[tokio::test]
    async fn malformed_percent_sequence_falls_back_to_raw_segment() {
        // Invalid UTF-8 after decoding must not panic or skip isolation; the
        // raw segment is looked up instead and simply misses.
        let mut dir = FakeDirectory::new().with_slug("shop%ff", 9);
        let f = facts("POST", "/orders/shop%ff");
        let res = resolve_tenant(&f, &mut dir).await.unwrap();
        assert_eq!(res, Resolution::Tenant(tenant(9)));
    }

    #[tokio::test]
    async fn single_tracking_token_resolves_tenant() {
        let mut dir = FakeDirectory::new().with_token("tok-1", 4);
        let f = facts("GET", "/orders/tracking/tok-1");
        let res = resolve_tenant(&f, &mut dir).await.unwrap();
        assert_eq!(res, Resolution::Tenant(tenant(4)));
    }

    #[tokio::test]
    async fn tracking_subpaths_resolve_through_the_same_token() {
        // Customer actions live under the token path; they must bind the
        // token's tenant exactly like the plain lookup does.
        let mut dir = FakeDirectory::new().with_token("tok-1", 4);
        for path in [
            "/orders/tracking/tok-1/reject",
            "/orders/tracking/tok-1/items/9/approve",
            "/orders/tracking/tok-1/items/9/reject",
        ] {
            let f = facts("POST", path);
            let res = resolve_tenant(&f, &mut dir).await.unwrap();
            assert_eq!(res, Resolution::Tenant(tenant(4)), "path {path}");
        }
    }

    #[tokio::test]
    async fn unknown_tracking_token_is_not_found() {
        let mut dir = FakeDirectory::new();
        let f = facts("GET", "/orders/tracking/ghost");
        let err = resolve_tenant(&f, &mut dir).await.unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[tokio::test]
    async fn batch_tokens_sharing_one_tenant_narrow_the_active_set() {
        let mut dir = FakeDirectory::new()
            .with_token("tok-1", 4)
            .with_token("tok-2", 4);
        let mut f = facts("GET", "/orders/tracking");
        f.query_tokens = vec![
            "tok-1".to_string(),
            "unknown".to_string(),
            "tok-2".to_string(),
        ];

        let res = resolve_tenant(&f, &mut dir).await.unwrap();
        assert_eq!(
            res,
            Resolution::TenantWithTokens {
                tenant_id: tenant(4),
                tokens: vec!["tok-1".to_string(), "tok-2".to_string()],
            }
        );
    }

    #[tokio::test]
    async fn batch_tokens_across_tenants_are_ambiguous() {
        let mut dir = FakeDirectory::new()
            .with_token("tok-1", 1)
            .with_token("tok-2", 2);
        let mut f = facts("GET", "/orders/tracking");
        f.query_tokens = vec!["tok-1".to_string(), "tok-2".to_string()];

        let err = resolve_tenant(&f, &mut dir).await.unwrap_err();
        assert_eq!(err, DomainError::TenantAmbiguous);
    }

    #[tokio::test]
    async fn batch_with_no_resolvable_tokens_skips_isolation() {
        // Deliberate fail-open: zero hits means the caller's result set will
        // be empty anyway, so the request proceeds with no tenant bound.
        let mut dir = FakeDirectory::new();
        let mut f = facts("GET", "/orders/tracking");
        f.query_tokens = vec!["ghost-1".to_string(), "ghost-2".to_string()];

        let res = resolve_tenant(&f, &mut dir).await.unwrap();
        assert_eq!(res, Resolution::NoTenant);
    }

    #[tokio::test]
    async fn duplicate_batch_tokens_are_looked_up_once() {
        let mut dir = FakeDirectory::new().with_token("tok-1", 4);
        let mut f = facts("GET", "/orders/tracking");
        f.query_tokens = vec![
            "tok-1".to_string(),
            "tok-1".to_string(),
            "tok-1".to_string(),
        ];

        let res = resolve_tenant(&f, &mut dir).await.unwrap();
        assert_eq!(
            res,
            Resolution::TenantWithTokens {
                tenant_id: tenant(4),
                tokens: vec!["tok-1".to_string()],
            }
        );
        assert_eq!(dir.lookups, 1);
    }

    #[tokio::test]
    async fn tenant_scoped_route_with_nothing_resolvable_is_unresolved() {
        let mut dir = FakeDirectory::new();
        for path in ["/customers", "/orders", "/products/123", "/availability-requests"] {
            let f = facts("GET", path);
            let err = resolve_tenant(&f, &mut dir).await.unwrap_err();
            assert_eq!(err, DomainError::TenantUnresolved, "path {path}");
        }
    }

    #[tokio::test]
    async fn paths_outside_tenant_scope_need_no_tenant() {
        let mut dir = FakeDirectory::new();
        for path in ["/health", "/auth/login", "/"] {
            let f = facts("GET", path);
            let res = resolve_tenant(&f, &mut dir).await.unwrap();
            assert_eq!(res, Resolution::NoTenant, "path {path}");
        }
    }

    #[test]
    fn tenant_scoped_prefix_check() {
        assert!(is_tenant_scoped("/orders/tracking/abc"));
        assert!(is_tenant_scoped("/products"));
        assert!(!is_tenant_scoped("/health"));
        assert!(!is_tenant_scoped("/"));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Identity precedence holds for arbitrary paths, methods and
            // header noise.
            #[test]
            fn identity_always_wins(
                raw_tenant in 1i64..1_000_000,
                method in "(GET|POST|PATCH|DELETE)",
                path in "/[a-z/%-]{0,40}",
                header in proptest::option::of("[a-z0-9-]{0,12}"),
            ) {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .build()
                    .unwrap();
                rt.block_on(async {
                    let mut dir = FakeDirectory::new();
                    let f = RequestFacts {
                        method,
                        path,
                        identity_tenant: Some(TenantId::from_raw(raw_tenant).unwrap()),
                        tenant_header: header,
                        query_tokens: vec![],
                    };
                    let res = resolve_tenant(&f, &mut dir).await.unwrap();
                    prop_assert_eq!(
                        res,
                        Resolution::Tenant(TenantId::from_raw(raw_tenant).unwrap())
                    );
                    prop_assert_eq!(dir.lookups, 0);
                    Ok(())
                })?;
            }
        }
    }
}
