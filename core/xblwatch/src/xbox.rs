//! Xbox Live identity and presence provider.
//!
//! Thin blocking client over the public endpoints. Token plumbing follows
//! the standard flow: refresh the OAuth access token from the saved tokens
//! file, exchange it for a user token, then an XSTS token, and sign every
//! request with `XBL3.0 x=<uhs>;<xsts>`. The one-time interactive
//! authorization that first produces the tokens file is out of scope here;
//! a missing file is a fatal startup error with a pointer at the flow.

use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use xblwatch_core::config::AuthConfig;
use xblwatch_core::types::RawPresence;
use xblwatch_core::{Result, WatchError};

const OAUTH_TOKEN_URL: &str = "https://login.live.com/oauth20_token.srf";
const OAUTH_SCOPE: &str = "Xboxlive.signin Xboxlive.offline_access";
const USER_AUTHENTICATE_URL: &str = "https://user.auth.xboxlive.com/user/authenticate";
const XSTS_AUTHORIZE_URL: &str = "https://xsts.auth.xboxlive.com/xsts/authorize";
const PROFILE_BASE_URL: &str = "https://profile.xboxlive.com";
const PRESENCE_BASE_URL: &str = "https://userpresence.xboxlive.com";
const CONNECTIVITY_PROBE_URL: &str = "http://www.google.com/";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// OAuth token set as stored in the tokens file and returned by refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OAuthTokens {
    access_token: String,
    refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct XboxTokenResponse {
    token: String,
    #[serde(default)]
    display_claims: Option<DisplayClaims>,
}

#[derive(Debug, Deserialize)]
struct DisplayClaims {
    #[serde(default)]
    xui: Vec<XuiClaim>,
}

#[derive(Debug, Deserialize)]
struct XuiClaim {
    #[serde(default)]
    uhs: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    #[serde(default)]
    profile_users: Vec<ProfileUser>,
}

#[derive(Debug, Deserialize)]
struct ProfileUser {
    id: String,
    #[serde(default)]
    settings: Vec<ProfileSetting>,
}

#[derive(Debug, Deserialize)]
struct ProfileSetting {
    id: String,
    #[serde(default)]
    value: Option<String>,
}

/// Profile details surfaced once at startup.
#[derive(Debug, Clone)]
pub struct ProfileInfo {
    pub xuid: u64,
    pub location: Option<String>,
    pub bio: Option<String>,
    pub real_name: Option<String>,
}

pub struct XboxClient {
    http: reqwest::blocking::Client,
    authorization: String,
}

impl XboxClient {
    /// Refreshes credentials from the tokens file and performs the
    /// user-token and XSTS exchanges. Any failure here is an init-time
    /// (fatal) error.
    pub fn connect(auth: &AuthConfig) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|err| api_error("build http client", err))?;

        let saved = load_tokens(&auth.tokens_file)?;
        let refreshed = refresh_oauth_tokens(&http, auth, &saved)?;
        if let Err(err) = save_tokens(&auth.tokens_file, &refreshed) {
            // Monitoring works with the in-memory tokens; the next restart
            // will just refresh from an older grant.
            warn!(error = %err, "Failed to rewrite tokens file");
        }

        let user_token = request_user_token(&http, &refreshed.access_token)?;
        let (xsts_token, user_hash) = request_xsts_token(&http, &user_token)?;

        Ok(XboxClient {
            http,
            authorization: format!("XBL3.0 x={};{}", user_hash, xsts_token),
        })
    }

    /// Resolves a gamertag to its XUID plus the optional profile details.
    pub fn resolve_profile(&self, gamertag: &str) -> Result<ProfileInfo> {
        let url = format!(
            "{}/users/gt({})/profile/settings?settings=Location,Bio,RealNameOverride",
            PROFILE_BASE_URL, gamertag
        );
        let response = self
            .http
            .get(url)
            .header("Authorization", &self.authorization)
            .header("x-xbl-contract-version", "2")
            .send()
            .map_err(|err| api_error("profile lookup", err))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(WatchError::GamertagNotFound(gamertag.to_string()));
        }
        let response = response
            .error_for_status()
            .map_err(|err| api_error("profile lookup", err))?;
        let profile: ProfileResponse = response
            .json()
            .map_err(|err| api_error("profile payload", err))?;

        let user = profile
            .profile_users
            .into_iter()
            .next()
            .ok_or_else(|| WatchError::GamertagNotFound(gamertag.to_string()))?;
        let xuid = user
            .id
            .parse::<u64>()
            .map_err(|_| WatchError::GamertagNotFound(gamertag.to_string()))?;

        let setting = |key: &str| {
            user.settings
                .iter()
                .find(|s| s.id == key)
                .and_then(|s| s.value.clone())
                .filter(|v| !v.is_empty())
        };

        Ok(ProfileInfo {
            xuid,
            location: setting("Location"),
            bio: setting("Bio"),
            real_name: setting("RealNameOverride"),
        })
    }

    /// Fetches the raw presence document for a XUID.
    pub fn presence(&self, xuid: u64) -> Result<RawPresence> {
        let url = format!("{}/users/xuid({})", PRESENCE_BASE_URL, xuid);
        self.http
            .get(url)
            .header("Authorization", &self.authorization)
            .header("x-xbl-contract-version", "3")
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(|err| api_error("presence fetch", err))?
            .json()
            .map_err(|err| api_error("presence payload", err))
    }
}

/// Startup probe: no route to a well-known URL means no point continuing.
pub fn check_connectivity(timeout: Duration) -> Result<()> {
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| api_error("build http client", err))?;
    client
        .get(CONNECTIVITY_PROBE_URL)
        .send()
        .map(|_| ())
        .map_err(|err| api_error("connectivity check", err))
}

fn api_error(context: &str, err: reqwest::Error) -> WatchError {
    WatchError::Api {
        context: context.to_string(),
        details: err.to_string(),
    }
}

fn load_tokens(path: &Path) -> Result<OAuthTokens> {
    if !path.exists() {
        return Err(WatchError::TokensNotFound(path.to_path_buf()));
    }
    let content = fs::read_to_string(path)
        .map_err(|err| WatchError::io(format!("read {}", path.display()), err))?;
    serde_json::from_str(&content)
        .map_err(|err| WatchError::json(format!("tokens file {}", path.display()), err))
}

fn save_tokens(path: &Path, tokens: &OAuthTokens) -> Result<()> {
    let payload = serde_json::to_string_pretty(tokens)
        .map_err(|err| WatchError::json("serialize tokens", err))?;
    fs::write(path, payload).map_err(|err| WatchError::io(format!("write {}", path.display()), err))
}

fn refresh_oauth_tokens(
    http: &reqwest::blocking::Client,
    auth: &AuthConfig,
    saved: &OAuthTokens,
) -> Result<OAuthTokens> {
    let mut form = vec![
        ("grant_type", "refresh_token"),
        ("refresh_token", saved.refresh_token.as_str()),
        ("client_id", auth.client_id.as_str()),
        ("scope", OAUTH_SCOPE),
    ];
    if !auth.client_secret.is_empty() {
        form.push(("client_secret", auth.client_secret.as_str()));
    }

    http.post(OAUTH_TOKEN_URL)
        .form(&form)
        .send()
        .and_then(|response| response.error_for_status())
        .map_err(|err| WatchError::TokenRefresh(err.to_string()))?
        .json()
        .map_err(|err| WatchError::TokenRefresh(err.to_string()))
}

fn request_user_token(http: &reqwest::blocking::Client, access_token: &str) -> Result<String> {
    let body = serde_json::json!({
        "RelyingParty": "http://auth.xboxlive.com",
        "TokenType": "JWT",
        "Properties": {
            "AuthMethod": "RPS",
            "SiteName": "user.auth.xboxlive.com",
            "RpsTicket": format!("d={}", access_token),
        },
    });
    let response: XboxTokenResponse = http
        .post(USER_AUTHENTICATE_URL)
        .json(&body)
        .send()
        .and_then(|response| response.error_for_status())
        .map_err(|err| api_error("user token exchange", err))?
        .json()
        .map_err(|err| api_error("user token payload", err))?;
    Ok(response.token)
}

/// Returns `(xsts_token, user_hash)`.
fn request_xsts_token(
    http: &reqwest::blocking::Client,
    user_token: &str,
) -> Result<(String, String)> {
    let body = serde_json::json!({
        "RelyingParty": "http://xboxlive.com",
        "TokenType": "JWT",
        "Properties": {
            "UserTokens": [user_token],
            "SandboxId": "RETAIL",
        },
    });
    let response: XboxTokenResponse = http
        .post(XSTS_AUTHORIZE_URL)
        .json(&body)
        .send()
        .and_then(|response| response.error_for_status())
        .map_err(|err| api_error("XSTS authorization", err))?
        .json()
        .map_err(|err| api_error("XSTS payload", err))?;

    let user_hash = response
        .display_claims
        .as_ref()
        .and_then(|claims| claims.xui.first())
        .and_then(|claim| claim.uhs.clone())
        .ok_or_else(|| WatchError::Api {
            context: "XSTS authorization".to_string(),
            details: "response carries no user hash".to_string(),
        })?;
    Ok((response.token, user_hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_tokens_file_is_a_distinct_error() {
        let temp = tempdir().unwrap();
        let result = load_tokens(&temp.path().join("nope.json"));
        assert!(matches!(result, Err(WatchError::TokensNotFound(_))));
    }

    #[test]
    fn tokens_round_trip_preserves_known_fields() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("tokens.json");
        std::fs::write(
            &path,
            r#"{
                "token_type": "bearer",
                "expires_in": 3600,
                "access_token": "at",
                "refresh_token": "rt",
                "user_id": "u1"
            }"#,
        )
        .unwrap();

        let tokens = load_tokens(&path).unwrap();
        assert_eq!(tokens.access_token, "at");
        assert_eq!(tokens.refresh_token, "rt");

        save_tokens(&path, &tokens).unwrap();
        let reloaded = load_tokens(&path).unwrap();
        assert_eq!(reloaded.expires_in, Some(3600));
        assert_eq!(reloaded.user_id.as_deref(), Some("u1"));
    }

    #[test]
    fn profile_response_parses_settings() {
        let payload = r#"{
            "profileUsers": [{
                "id": "2533274812345678",
                "hostId": "2533274812345678",
                "settings": [
                    {"id": "Location", "value": "Warsaw"},
                    {"id": "Bio", "value": ""},
                    {"id": "RealNameOverride", "value": "M."}
                ],
                "isSponsoredUser": false
            }]
        }"#;
        let parsed: ProfileResponse = serde_json::from_str(payload).unwrap();
        let user = &parsed.profile_users[0];
        assert_eq!(user.id, "2533274812345678");
        assert_eq!(user.settings.len(), 3);
    }
}
