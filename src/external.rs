//! Handle resolution delegated to a remote Handle server.
//!
//! Handles are still minted and bound in the local store; the remote server
//! is the public record and is consulted for resolution.

use crate::config::{ExternalConfig, HandleConfig};
use crate::error::{HandleError, Result};
use crate::parse::HandleParser;
use crate::resolve::{HandleResolver, LocalHandleResolver};
use crate::resource::{HandleTarget, ResourceRef};
use crate::store::{HandleRecord, HandleStore};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Response code the Handle server uses for success.
const RC_SUCCESS: i32 = 1;
/// Response code for "handle not found".
const RC_HANDLE_NOT_FOUND: i32 = 100;

/// Index of the URL value registered for every handle.
pub const URL_VALUE_INDEX: u32 = 1;

/// One typed value attached to a handle on the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandleValue {
    pub index: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: HandleData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandleData {
    pub format: String,
    pub value: serde_json::Value,
}

impl HandleValue {
    pub fn url(index: u32, url: impl Into<String>) -> Self {
        Self {
            index,
            kind: "URL".to_string(),
            data: HandleData {
                format: "string".to_string(),
                value: serde_json::Value::String(url.into()),
            },
        }
    }

    /// The value as text, when it is a string value.
    pub fn text(&self) -> Option<&str> {
        self.data.value.as_str()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HandleResponse {
    response_code: i32,
    #[serde(default)]
    values: Vec<HandleValue>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Serialize)]
struct HandleRequest<'a> {
    values: &'a [HandleValue],
}

/// Server secret key. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(String);

impl SecretKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Read the key from `path`. A missing, unreadable or empty file is an error.
    ///
    /// # Errors
    ///
    /// Returns `Credential` naming `path` when the key cannot be read.
    pub fn load(path: &Path) -> Result<Self> {
        let credential_error = |message: String| HandleError::Credential {
            path: path.display().to_string(),
            message,
        };
        let contents = std::fs::read_to_string(path).map_err(|e| credential_error(e.to_string()))?;
        let key = contents.trim();
        if key.is_empty() {
            return Err(credential_error("secret key file is empty".to_string()));
        }
        Ok(Self(key.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// Administrator identity used for writes to the Handle server.
#[derive(Debug, Clone)]
pub struct Credentials {
    admin_handle: String,
    admin_index: u32,
    key: SecretKey,
}

impl Credentials {
    pub fn new(admin_handle: impl Into<String>, admin_index: u32, key: SecretKey) -> Self {
        Self {
            admin_handle: admin_handle.into(),
            admin_index,
            key,
        }
    }

    /// Read the secret key named by `config`.
    ///
    /// # Errors
    ///
    /// Returns `Credential` when the key file is missing, unreadable or empty.
    pub fn load(config: &ExternalConfig) -> Result<Self> {
        let key = SecretKey::load(&config.secret_key_path)?;
        Ok(Self::new(config.admin_handle.clone(), config.admin_index, key))
    }

    /// Basic-auth user name, `<index>%3A<admin handle>`.
    pub fn username(&self) -> String {
        format!("{}%3A{}", self.admin_index, self.admin_handle)
    }

    pub fn key(&self) -> &SecretKey {
        &self.key
    }
}

/// Transport to a Handle server.
pub trait HandleServerClient: Send + Sync {
    /// Every value of `handle`, or `None` when the server does not know it.
    fn lookup(&self, handle: &str) -> Result<Option<Vec<HandleValue>>>;

    /// Create `handle` with `values`, replacing any existing values.
    fn create(&self, handle: &str, values: &[HandleValue], credentials: &Credentials) -> Result<()>;

    /// Delete `handle`. Deleting an unknown handle succeeds.
    fn delete(&self, handle: &str, credentials: &Credentials) -> Result<()>;
}

/// [`HandleServerClient`] for the Handle.net JSON REST API.
#[derive(Debug, Clone)]
pub struct HttpHandleClient {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpHandleClient {
    /// # Errors
    ///
    /// Returns `Config` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HandleError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn from_config(config: &ExternalConfig) -> Result<Self> {
        Self::new(config.server_url.clone(), config.timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, handle: &str) -> String {
        format!(
            "{}/api/handles/{}",
            self.base_url.trim_end_matches('/'),
            handle.trim_start_matches('/')
        )
    }
}

fn transport_error(handle: &str, err: &reqwest::Error) -> HandleError {
    let message = format!("request for {handle} failed: {err}");
    if err.is_timeout() || err.is_connect() {
        HandleError::transient(message)
    } else {
        HandleError::fatal(message)
    }
}

fn status_error(handle: &str, status: StatusCode) -> HandleError {
    let message = format!("handle server answered {status} for {handle}");
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        HandleError::transient(message)
    } else {
        HandleError::fatal(message)
    }
}

fn lookup_result(handle: &str, response: HandleResponse) -> Result<Option<Vec<HandleValue>>> {
    match response.response_code {
        RC_SUCCESS => Ok(Some(response.values)),
        RC_HANDLE_NOT_FOUND => Ok(None),
        code => Err(HandleError::fatal(format!(
            "handle server returned code {code} for {handle}: {}",
            response.message.unwrap_or_default()
        ))),
    }
}

impl HandleServerClient for HttpHandleClient {
    fn lookup(&self, handle: &str) -> Result<Option<Vec<HandleValue>>> {
        let response = self
            .client
            .get(self.endpoint(handle))
            .send()
            .map_err(|e| transport_error(handle, &e))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(status_error(handle, status));
        }
        let body = response
            .json::<HandleResponse>()
            .map_err(|e| HandleError::fatal(format!("malformed response for {handle}: {e}")))?;
        lookup_result(handle, body)
    }

    fn create(&self, handle: &str, values: &[HandleValue], credentials: &Credentials) -> Result<()> {
        let response = self
            .client
            .put(self.endpoint(handle))
            .query(&[("overwrite", "true")])
            .basic_auth(credentials.username(), Some(credentials.key().expose()))
            .json(&HandleRequest { values })
            .send()
            .map_err(|e| transport_error(handle, &e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(handle, status));
        }
        debug!(handle, "registered handle with remote server");
        Ok(())
    }

    fn delete(&self, handle: &str, credentials: &Credentials) -> Result<()> {
        let response = self
            .client
            .delete(self.endpoint(handle))
            .basic_auth(credentials.username(), Some(credentials.key().expose()))
            .send()
            .map_err(|e| transport_error(handle, &e))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND || status.is_success() {
            debug!(handle, "deleted handle from remote server");
            return Ok(());
        }
        Err(status_error(handle, status))
    }
}

/// Resolver that mints locally and publishes to a remote Handle server.
pub struct ExternalHandleResolver<S: HandleStore, C: HandleServerClient> {
    local: LocalHandleResolver<S>,
    client: C,
    remote: ExternalConfig,
}

impl<S: HandleStore, C: HandleServerClient> ExternalHandleResolver<S, C> {
    pub fn new(config: HandleConfig, store: S, client: C, remote: ExternalConfig) -> Self {
        Self {
            local: LocalHandleResolver::new(config, store),
            client,
            remote,
        }
    }

    pub fn local(&self) -> &LocalHandleResolver<S> {
        &self.local
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    fn register(&self, handle: &str, credentials: &Credentials) -> Result<()> {
        let url = self.local.landing_url(handle);
        self.client
            .create(handle, &[HandleValue::url(URL_VALUE_INDEX, url)], credentials)
            .inspect_err(|e| warn!(handle, error = %e, "failed to register handle remotely"))
    }
}

impl<S: HandleStore, C: HandleServerClient> HandleResolver for ExternalHandleResolver<S, C> {
    fn parser(&self) -> &HandleParser {
        self.local.parser()
    }

    fn config(&self) -> &HandleConfig {
        self.local.config()
    }

    /// Mints locally, then registers remotely. If registration fails the
    /// local binding is tombstoned and removed from `target`, so a retry
    /// leaves the resource with a single live handle.
    fn mint_and_bind(&self, target: &mut dyn HandleTarget) -> Result<String> {
        let credentials = Credentials::load(&self.remote)?;
        let handle = self.local.mint_and_bind(target)?;
        if let Err(err) = self.register(&handle, &credentials) {
            self.local.release(target, &handle)?;
            return Err(err);
        }
        Ok(handle)
    }

    /// Binds locally, then registers remotely. A failed registration undoes a
    /// new local binding; a binding that already existed is left alone.
    fn bind_explicit(
        &self,
        target: &mut dyn HandleTarget,
        supplied: &str,
        force: bool,
    ) -> Result<String> {
        let credentials = Credentials::load(&self.remote)?;
        let already_bound = self.local.is_bound_to(supplied, target.id())?;
        let handle = self.local.bind_explicit(target, supplied, force)?;
        if let Err(err) = self.register(&handle, &credentials) {
            if !already_bound {
                self.local.release(target, &handle)?;
            }
            return Err(err);
        }
        Ok(handle)
    }

    /// Deletes each handle remotely before tombstoning it locally. A handle
    /// whose remote delete fails stays on `target`, so a retry picks it up.
    fn unbind(&self, target: &mut dyn HandleTarget) -> Result<()> {
        let handles = target.handles().to_vec();
        if handles.is_empty() {
            return self.local.unbind(target);
        }
        let credentials = Credentials::load(&self.remote)?;
        for handle in &handles {
            self.client.delete(handle, &credentials)?;
            self.local.release(target, handle)?;
        }
        Ok(())
    }

    fn resolve(&self, identifier: &str) -> Result<Option<ResourceRef>> {
        let Some(handle) = self.parse_handle(identifier) else {
            return Ok(None);
        };
        if self.client.lookup(&handle)?.is_none() {
            return Ok(None);
        }
        Ok(self
            .local
            .find_record(&handle)?
            .filter(HandleRecord::is_bound)
            .and_then(|record| record.resource))
    }

    fn resolve_to_url(&self, handle: &str) -> Result<Option<String>> {
        let Some(values) = self.client.lookup(handle)? else {
            return Ok(None);
        };
        let url = values
            .iter()
            .find(|v| v.kind == "URL")
            .and_then(HandleValue::text)
            .map(ToString::to_string);
        debug!(handle, url = ?url, "resolved handle to URL");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Resource, ResourceType};
    use crate::store::MemoryHandleStore;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    #[derive(Default)]
    struct MockServer {
        handles: Mutex<HashMap<String, Vec<HandleValue>>>,
        failure: Mutex<Option<HandleError>>,
        next_failure: Mutex<Option<HandleError>>,
        usernames: Mutex<Vec<String>>,
    }

    impl MockServer {
        fn fail_with(&self, err: HandleError) {
            *self.failure.lock() = Some(err);
        }

        fn fail_once(&self, err: HandleError) {
            *self.next_failure.lock() = Some(err);
        }

        fn check(&self) -> Result<()> {
            if let Some(err) = self.next_failure.lock().take() {
                return Err(err);
            }
            self.failure.lock().clone().map_or(Ok(()), Err)
        }
    }

    impl HandleServerClient for MockServer {
        fn lookup(&self, handle: &str) -> Result<Option<Vec<HandleValue>>> {
            self.check()?;
            Ok(self.handles.lock().get(handle).cloned())
        }

        fn create(&self, handle: &str, values: &[HandleValue], credentials: &Credentials) -> Result<()> {
            self.check()?;
            self.usernames.lock().push(credentials.username());
            self.handles.lock().insert(handle.to_string(), values.to_vec());
            Ok(())
        }

        fn delete(&self, handle: &str, _credentials: &Credentials) -> Result<()> {
            self.check()?;
            self.handles.lock().remove(handle);
            Ok(())
        }
    }

    fn key_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn resolver_with_key(path: PathBuf) -> ExternalHandleResolver<MemoryHandleStore, MockServer> {
        let config = HandleConfig::new("10.5555").ui_url("https://repo.example.edu/");
        let remote = ExternalConfig::new("https://hs.example.org", "10.5555", path);
        ExternalHandleResolver::new(config, MemoryHandleStore::new(), MockServer::default(), remote)
    }

    // ========== Secret key tests ==========

    #[test]
    fn test_secret_key_load_trims() {
        let file = key_file("  s3cret\n");
        let key = SecretKey::load(file.path()).unwrap();
        assert_eq!(key.expose(), "s3cret");
    }

    #[test]
    fn test_secret_key_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = SecretKey::load(&dir.path().join("absent.key")).unwrap_err();
        assert!(matches!(err, HandleError::Credential { .. }));
    }

    #[test]
    fn test_secret_key_empty_file() {
        let file = key_file("\n\n");
        assert!(matches!(
            SecretKey::load(file.path()),
            Err(HandleError::Credential { .. })
        ));
    }

    #[test]
    fn test_secret_key_debug_is_redacted() {
        let key = SecretKey::new("hunter2");
        assert!(!format!("{key:?}").contains("hunter2"));
    }

    #[test]
    fn test_credentials_username() {
        let credentials = Credentials::new("0.NA/10.5555", 300, SecretKey::new("k"));
        assert_eq!(credentials.username(), "300%3A0.NA/10.5555");
    }

    // ========== Resolver tests ==========

    #[test]
    fn test_mint_registers_url_value() {
        let file = key_file("key");
        let resolver = resolver_with_key(file.path().to_path_buf());
        let mut item = Resource::new(ResourceType::Item);
        let handle = resolver.mint_and_bind(&mut item).unwrap();

        assert_eq!(
            resolver.resolve_to_url(&handle).unwrap().as_deref(),
            Some("https://repo.example.edu/handle/10.5555/1")
        );
        assert_eq!(
            resolver.resolve(&format!("hdl:{handle}")).unwrap(),
            Some(item.to_ref())
        );
        assert_eq!(resolver.client().usernames.lock()[0], "300%3A0.NA/10.5555");
    }

    #[test]
    fn test_missing_credential_aborts_before_binding() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver_with_key(dir.path().join("missing.key"));
        let mut item = Resource::new(ResourceType::Item);
        assert!(matches!(
            resolver.mint_and_bind(&mut item),
            Err(HandleError::Credential { .. })
        ));
        assert!(item.handles().is_empty());
        assert_eq!(resolver.local().count_total().unwrap(), 0);
        assert!(resolver.client().handles.lock().is_empty());
    }

    #[test]
    fn test_bind_explicit_registers_remotely() {
        let file = key_file("key");
        let resolver = resolver_with_key(file.path().to_path_buf());
        let mut item = Resource::new(ResourceType::Item);
        resolver.bind_explicit(&mut item, "10.5555/thesis-7", false).unwrap();
        assert!(resolver.client().handles.lock().contains_key("10.5555/thesis-7"));
    }

    #[test]
    fn test_bind_explicit_keeps_local_decision_table() {
        let file = key_file("key");
        let resolver = resolver_with_key(file.path().to_path_buf());
        let mut a = Resource::new(ResourceType::Item);
        let mut b = Resource::new(ResourceType::Item);
        resolver.bind_explicit(&mut a, "10.5555/x", false).unwrap();
        assert!(matches!(
            resolver.bind_explicit(&mut b, "10.5555/x", true),
            Err(HandleError::AlreadyBound { .. })
        ));
    }

    #[test]
    fn test_unbind_deletes_remote_handle() {
        let file = key_file("key");
        let resolver = resolver_with_key(file.path().to_path_buf());
        let mut item = Resource::new(ResourceType::Item);
        let handle = resolver.mint_and_bind(&mut item).unwrap();
        resolver.unbind(&mut item).unwrap();
        assert_eq!(resolver.resolve(&handle).unwrap(), None);
        assert_eq!(resolver.resolve_to_url(&handle).unwrap(), None);
    }

    #[test]
    fn test_unbind_without_handles_needs_no_credential() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver_with_key(dir.path().join("missing.key"));
        let mut item = Resource::new(ResourceType::Item);
        resolver.unbind(&mut item).unwrap();
    }

    #[test]
    fn test_remote_not_found_is_none() {
        let file = key_file("key");
        let resolver = resolver_with_key(file.path().to_path_buf());
        assert_eq!(resolver.resolve("10.5555/404").unwrap(), None);
        assert_eq!(resolver.resolve("not a handle").unwrap(), None);
    }

    #[test]
    fn test_transient_failure_surfaces() {
        let file = key_file("key");
        let resolver = resolver_with_key(file.path().to_path_buf());
        resolver
            .client()
            .fail_with(HandleError::transient("connection reset"));
        let err = resolver.resolve("10.5555/1").unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_remote_registration_failure_surfaces() {
        let file = key_file("key");
        let resolver = resolver_with_key(file.path().to_path_buf());
        resolver.client().fail_with(HandleError::fatal("401 Unauthorized"));
        let mut item = Resource::new(ResourceType::Item);
        let err = resolver.mint_and_bind(&mut item).unwrap_err();
        assert!(matches!(err, HandleError::RemoteResolution { transient: false, .. }));
        // Tombstone kept, binding gone.
        assert_eq!(resolver.local().count_total().unwrap(), 1);
        assert!(item.handles().is_empty());
        assert_eq!(resolver.local().resolve("10.5555/1").unwrap(), None);
    }

    #[test]
    fn test_mint_retry_after_registration_failure() {
        let file = key_file("key");
        let resolver = resolver_with_key(file.path().to_path_buf());
        resolver.client().fail_once(HandleError::transient("503 Service Unavailable"));
        let mut item = Resource::new(ResourceType::Item);
        assert!(resolver.mint_and_bind(&mut item).unwrap_err().is_transient());

        let handle = resolver.mint_and_bind(&mut item).unwrap();
        assert_eq!(handle, "10.5555/2");
        assert_eq!(item.handles(), ["10.5555/2".to_string()]);
        assert_eq!(resolver.local().resolve("10.5555/1").unwrap(), None);
        assert_eq!(resolver.local().resolve("10.5555/2").unwrap(), Some(item.to_ref()));
        assert!(!resolver.client().handles.lock().contains_key("10.5555/1"));
    }

    #[test]
    fn test_bind_explicit_rolls_back_on_registration_failure() {
        let file = key_file("key");
        let resolver = resolver_with_key(file.path().to_path_buf());
        resolver.client().fail_once(HandleError::fatal("401 Unauthorized"));
        let mut item = Resource::new(ResourceType::Item);
        assert!(resolver.bind_explicit(&mut item, "10.5555/thesis-7", false).is_err());
        assert!(item.handles().is_empty());
        assert_eq!(resolver.local().resolve("10.5555/thesis-7").unwrap(), None);

        // The tombstone can be rebound by the same resource.
        resolver.bind_explicit(&mut item, "10.5555/thesis-7", false).unwrap();
        assert_eq!(item.handles(), ["10.5555/thesis-7".to_string()]);
        assert!(resolver.client().handles.lock().contains_key("10.5555/thesis-7"));
    }

    #[test]
    fn test_bind_explicit_keeps_existing_binding_on_registration_failure() {
        let file = key_file("key");
        let resolver = resolver_with_key(file.path().to_path_buf());
        let mut item = Resource::new(ResourceType::Item);
        resolver.bind_explicit(&mut item, "10.5555/x", false).unwrap();
        resolver.client().fail_once(HandleError::transient("timeout"));
        assert!(resolver.bind_explicit(&mut item, "10.5555/x", false).is_err());
        assert_eq!(item.handles(), ["10.5555/x".to_string()]);
        assert_eq!(resolver.local().resolve("10.5555/x").unwrap(), Some(item.to_ref()));
    }

    #[test]
    fn test_unbind_retry_after_delete_failure() {
        let file = key_file("key");
        let resolver = resolver_with_key(file.path().to_path_buf());
        let mut item = Resource::new(ResourceType::Item);
        let handle = resolver.mint_and_bind(&mut item).unwrap();

        resolver.client().fail_once(HandleError::transient("connection reset"));
        assert!(resolver.unbind(&mut item).unwrap_err().is_transient());
        assert_eq!(item.handles(), [handle.clone()]);
        assert!(resolver.client().handles.lock().contains_key(&handle));
        assert_eq!(resolver.local().resolve(&handle).unwrap(), Some(item.to_ref()));

        resolver.unbind(&mut item).unwrap();
        assert!(item.handles().is_empty());
        assert!(!resolver.client().handles.lock().contains_key(&handle));
        assert_eq!(resolver.local().resolve(&handle).unwrap(), None);
    }

    // ========== HTTP classification tests ==========

    #[test]
    fn test_status_classification() {
        assert!(status_error("h", StatusCode::SERVICE_UNAVAILABLE).is_transient());
        assert!(status_error("h", StatusCode::BAD_GATEWAY).is_transient());
        assert!(!status_error("h", StatusCode::UNAUTHORIZED).is_transient());
        assert!(!status_error("h", StatusCode::FORBIDDEN).is_transient());
    }

    #[test]
    fn test_lookup_response_codes() {
        let found: HandleResponse = serde_json::from_str(
            r#"{"responseCode":1,"handle":"10.5555/1","values":[
                {"index":1,"type":"URL","data":{"format":"string","value":"https://x/handle/10.5555/1"}}
            ]}"#,
        )
        .unwrap();
        let values = lookup_result("10.5555/1", found).unwrap().unwrap();
        assert_eq!(values[0].text(), Some("https://x/handle/10.5555/1"));

        let missing: HandleResponse =
            serde_json::from_str(r#"{"responseCode":100,"handle":"10.5555/2"}"#).unwrap();
        assert_eq!(lookup_result("10.5555/2", missing).unwrap(), None);

        let odd: HandleResponse =
            serde_json::from_str(r#"{"responseCode":2,"message":"Error"}"#).unwrap();
        assert!(!lookup_result("10.5555/3", odd).unwrap_err().is_transient());
    }

    #[test]
    fn test_endpoint() {
        let client = HttpHandleClient::new("https://hs.example.org/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.endpoint("10.5555/1"),
            "https://hs.example.org/api/handles/10.5555/1"
        );
    }

    #[test]
    fn test_connection_refused_is_transient() {
        let client = HttpHandleClient::new("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
        let err = client.lookup("10.5555/1").unwrap_err();
        assert!(err.is_transient());
    }
}
