//! Authorization kernel (§4.4): resolves the caller's bearer token into a
//! `User`, then answers the handful of predicates every executor needs.
//! Everything past the initial token lookup is backed by the store's
//! relation multimaps, so the common case never touches the database.

use axum::extract::{FromRequestParts, Query, State};
use axum::http::request::Parts;
use serde::Deserialize;
use uuid::Uuid;

use meridian_store::Store;

use crate::app::App;
use crate::error::ApiError;

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// The authenticated caller. Extracting this from a request performs the
/// token lookup; everything else (`may_act_on_group`, etc.) is then a plain
/// method call against the store.
pub struct AuthUser(pub meridian_store::entities::User);

impl FromRequestParts<App> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &App) -> Result<Self, Self::Rejection> {
        let Query(q) = Query::<TokenQuery>::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::Unauthenticated)?;
        let State(app) = State::<App>::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::Unauthenticated)?;

        let token = q.token.ok_or(ApiError::Unauthenticated)?;
        let user = app
            .store
            .get_user_by_token(&token)
            .await
            .map_err(ApiError::StoreFailure)?
            .ok_or(ApiError::Unauthenticated)?;
        Ok(AuthUser(user))
    }
}

impl AuthUser {
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.0.admin { Ok(()) } else { Err(ApiError::Forbidden) }
    }

    /// A group operation is permitted for an admin or a member of the group.
    pub async fn may_act_on_group(&self, store: &Store, group: Uuid) -> Result<(), ApiError> {
        if self.0.admin {
            return Ok(());
        }
        if store.is_group_member(group, self.0.id).await.map_err(ApiError::StoreFailure)? {
            return Ok(());
        }
        Err(ApiError::Forbidden)
    }

    /// Installing `app` on `cluster` on behalf of `group`: the caller must be
    /// a member of `group`, `group` must be allowed on `cluster` (by
    /// ownership or grant), and `group` must be allowed to install `app`
    /// there (wildcard grants count).
    pub async fn may_install_on_cluster(
        &self,
        store: &Store,
        group: Uuid,
        cluster: Uuid,
        app: &str,
    ) -> Result<(), ApiError> {
        if !self.0.admin && !store.is_group_member(group, self.0.id).await.map_err(ApiError::StoreFailure)? {
            return Err(ApiError::Forbidden);
        }
        if !store.may_use_cluster(cluster, group).await.map_err(ApiError::StoreFailure)? {
            return Err(ApiError::Forbidden);
        }
        if !store.may_install_app(cluster, group, app).await.map_err(ApiError::StoreFailure)? {
            return Err(ApiError::Forbidden);
        }
        Ok(())
    }

    /// Instance/secret operations: admin, or a member of the owning group.
    pub async fn may_act_on_owning_group(&self, store: &Store, owning_group: Uuid) -> Result<(), ApiError> {
        self.may_act_on_group(store, owning_group).await
    }

    pub fn is_self(&self, user: Uuid) -> bool {
        self.0.id == user
    }
}
