//! Request extractors.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use domain::PlayerId;

use crate::error::ApiError;

/// Header carrying the authenticated player, set by the upstream auth layer.
pub const PLAYER_ID_HEADER: &str = "x-player-id";

/// Longest player id the stage services accept, in characters.
pub const MAX_PLAYER_ID_LEN: usize = 64;

/// The player a request acts on behalf of.
#[derive(Debug, Clone)]
pub struct PlayerIdentity(pub PlayerId);

impl<S: Send + Sync> FromRequestParts<S> for PlayerIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(PLAYER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthorized("missing X-Player-Id header".to_string()))?;

        let player_id = value
            .to_str()
            .map_err(|_| ApiError::Unauthorized("X-Player-Id is not valid text".to_string()))?
            .trim();

        if player_id.is_empty() {
            return Err(ApiError::Unauthorized("X-Player-Id is empty".to_string()));
        }
        if player_id.chars().count() > MAX_PLAYER_ID_LEN {
            return Err(ApiError::BadRequest(format!(
                "X-Player-Id exceeds {MAX_PLAYER_ID_LEN} characters"
            )));
        }

        Ok(PlayerIdentity(PlayerId::new(player_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(value: Option<&str>) -> Result<PlayerIdentity, ApiError> {
        let mut builder = Request::builder();
        if let Some(value) = value {
            builder = builder.header(PLAYER_ID_HEADER, value);
        }
        let (mut parts, ()) = builder.body(()).unwrap().into_parts();
        PlayerIdentity::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_identity_is_trimmed() {
        let PlayerIdentity(player_id) = extract(Some(" player-1 ")).await.unwrap();
        assert_eq!(player_id, PlayerId::new("player-1"));
    }

    #[tokio::test]
    async fn test_missing_or_blank_identity_is_unauthorized() {
        assert!(matches!(extract(None).await, Err(ApiError::Unauthorized(_))));
        assert!(matches!(extract(Some("  ")).await, Err(ApiError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_overlong_identity_is_a_bad_request() {
        let at_limit = "p".repeat(MAX_PLAYER_ID_LEN);
        assert!(extract(Some(&at_limit)).await.is_ok());

        let too_long = "p".repeat(MAX_PLAYER_ID_LEN + 1);
        assert!(matches!(
            extract(Some(&too_long)).await,
            Err(ApiError::BadRequest(_))
        ));
    }
}
