use crate::{ControlPlane, RemoteConfig, RemoteError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{Read, Write};
use stevedore_types::{
    App, AppCreateOptions, AppUpdateOptions, Build, Release, ReleaseCreateOptions, Resource,
};

type HttpResponse = ureq::http::Response<ureq::Body>;

/// HTTP control-plane adapter.
///
/// Expects a REST API rooted at the configured URL:
/// - `POST /apps`                                create application
/// - `GET  /apps/<app>`                          read application
/// - `PUT  /apps/<app>`                          update parameters
/// - `POST /apps/<app>/builds/import`            upload build artifact
/// - `GET  /apps/<app>/builds/<id>.tgz`          download build artifact
/// - `GET  /apps/<app>/releases/<id>`            read release
/// - `POST /apps/<app>/releases`                 create release
/// - `POST /apps/<app>/releases/<id>/promote`    promote release
/// - `GET  /apps/<app>/resources`                list resources
/// - `GET|PUT /apps/<app>/resources/<name>/data` export / import resource data
pub struct HttpControlPlane {
    config: RemoteConfig,
    agent: ureq::Agent,
}

#[derive(Serialize)]
struct CreateAppBody<'a> {
    name: &'a str,
    #[serde(flatten)]
    opts: &'a AppCreateOptions,
}

impl HttpControlPlane {
    pub fn new(config: RemoteConfig) -> Self {
        let agent = ureq::Agent::new_with_defaults();
        Self { config, agent }
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.url)
    }

    fn authed<B>(&self, req: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        let req = req.header(
            "X-Stevedore-Protocol",
            &crate::PROTOCOL_VERSION.to_string(),
        );
        match self.config.auth_token {
            Some(ref token) => req.header("Authorization", &format!("Bearer {token}")),
            None => req,
        }
    }

    fn check(
        result: Result<HttpResponse, ureq::Error>,
        method: &str,
        url: &str,
    ) -> Result<HttpResponse, RemoteError> {
        let resp = match result {
            Ok(r) => r,
            Err(ureq::Error::StatusCode(code)) => return Err(status_error(code, method, url)),
            Err(ureq::Error::Io(e)) => return Err(RemoteError::Io(e)),
            Err(e) => return Err(RemoteError::Http(e.to_string())),
        };
        let code = resp.status().as_u16();
        if code >= 400 {
            return Err(status_error(code, method, url));
        }
        Ok(resp)
    }

    fn get(&self, path: &str) -> Result<HttpResponse, RemoteError> {
        let url = self.url(path);
        tracing::debug!("GET {url}");
        Self::check(self.authed(self.agent.get(url.as_str())).call(), "GET", &url)
    }

    fn send_json<T: Serialize>(
        &self,
        method: &str,
        path: &str,
        body: &T,
    ) -> Result<HttpResponse, RemoteError> {
        let url = self.url(path);
        let data = serde_json::to_vec(body).map_err(|e| RemoteError::Serialization(e.to_string()))?;
        tracing::debug!("{method} {url} ({} bytes)", data.len());
        let req = match method {
            "PUT" => self.agent.put(url.as_str()),
            _ => self.agent.post(url.as_str()),
        };
        let result = self
            .authed(req)
            .header("Content-Type", "application/json")
            .send(&data[..]);
        Self::check(result, method, &url)
    }

    fn send_bytes(
        &self,
        method: &str,
        path: &str,
        source: &mut dyn Read,
    ) -> Result<HttpResponse, RemoteError> {
        let url = self.url(path);
        let mut data = Vec::new();
        source.read_to_end(&mut data)?;
        tracing::debug!("{method} {url} ({} bytes)", data.len());
        let req = match method {
            "PUT" => self.agent.put(url.as_str()),
            _ => self.agent.post(url.as_str()),
        };
        let result = self
            .authed(req)
            .header("Content-Type", "application/octet-stream")
            .send(&data[..]);
        Self::check(result, method, &url)
    }

    fn post_empty(&self, path: &str) -> Result<HttpResponse, RemoteError> {
        let url = self.url(path);
        tracing::debug!("POST {url}");
        Self::check(self.authed(self.agent.post(url.as_str())).send_empty(), "POST", &url)
    }
}

fn status_error(code: u16, method: &str, url: &str) -> RemoteError {
    match code {
        404 => RemoteError::NotFound(url.to_owned()),
        409 => RemoteError::Conflict(format!("{method} {url}")),
        _ => RemoteError::Http(format!("HTTP {code} for {method} {url}")),
    }
}

/// Join path segments into an absolute path. Each segment is percent-encoded
/// so a name always stays a single segment.
fn api_path(segments: &[&str]) -> String {
    let mut path = String::new();
    for segment in segments {
        path.push('/');
        for byte in segment.bytes() {
            if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
                path.push(char::from(byte));
            } else {
                path.push_str(&format!("%{byte:02X}"));
            }
        }
    }
    path
}

fn read_body(resp: HttpResponse) -> Result<Vec<u8>, RemoteError> {
    let mut reader = resp.into_body().into_reader();
    let mut body = Vec::new();
    reader
        .read_to_end(&mut body)
        .map_err(|e| RemoteError::Http(e.to_string()))?;
    Ok(body)
}

fn read_json<T: DeserializeOwned>(resp: HttpResponse) -> Result<T, RemoteError> {
    let body = read_body(resp)?;
    serde_json::from_slice(&body).map_err(|e| RemoteError::Serialization(e.to_string()))
}

impl ControlPlane for HttpControlPlane {
    fn app_create(&self, name: &str, opts: &AppCreateOptions) -> Result<App, RemoteError> {
        let resp = self.send_json("POST", "/apps", &CreateAppBody { name, opts })?;
        read_json(resp)
    }

    fn app_get(&self, name: &str) -> Result<App, RemoteError> {
        read_json(self.get(&api_path(&["apps", name]))?)
    }

    fn app_update(&self, name: &str, opts: &AppUpdateOptions) -> Result<(), RemoteError> {
        self.send_json("PUT", &api_path(&["apps", name]), opts)?;
        Ok(())
    }

    fn build_import(&self, app: &str, source: &mut dyn Read) -> Result<Build, RemoteError> {
        let path = api_path(&["apps", app, "builds", "import"]);
        let resp = self.send_bytes("POST", &path, source)?;
        read_json(resp)
    }

    fn build_export(
        &self,
        app: &str,
        build_id: &str,
        dest: &mut dyn Write,
    ) -> Result<(), RemoteError> {
        let artifact = format!("{build_id}.tgz");
        let resp = self.get(&api_path(&["apps", app, "builds", &artifact]))?;
        let mut reader = resp.into_body().into_reader();
        std::io::copy(&mut reader, dest)?;
        Ok(())
    }

    fn release_get(&self, app: &str, release_id: &str) -> Result<Release, RemoteError> {
        read_json(self.get(&api_path(&["apps", app, "releases", release_id]))?)
    }

    fn release_create(
        &self,
        app: &str,
        opts: &ReleaseCreateOptions,
    ) -> Result<Release, RemoteError> {
        read_json(self.send_json("POST", &api_path(&["apps", app, "releases"]), opts)?)
    }

    fn release_promote(&self, app: &str, release_id: &str) -> Result<(), RemoteError> {
        self.post_empty(&api_path(&["apps", app, "releases", release_id, "promote"]))?;
        Ok(())
    }

    fn resource_list(&self, app: &str) -> Result<Vec<Resource>, RemoteError> {
        read_json(self.get(&api_path(&["apps", app, "resources"]))?)
    }

    fn resource_export(&self, app: &str, name: &str) -> Result<Box<dyn Read>, RemoteError> {
        let resp = self.get(&api_path(&["apps", app, "resources", name, "data"]))?;
        Ok(Box::new(resp.into_body().into_reader()))
    }

    fn resource_import(
        &self,
        app: &str,
        name: &str,
        source: &mut dyn Read,
    ) -> Result<(), RemoteError> {
        let path = api_path(&["apps", app, "resources", name, "data"]);
        self.send_bytes("PUT", &path, source)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;
    use std::sync::{Arc, Mutex};

    /// A captured HTTP request for header and body inspection.
    #[derive(Debug, Clone)]
    struct CapturedRequest {
        method: String,
        path: String,
        headers: HashMap<String, String>,
        body: Vec<u8>,
    }

    /// Canned response keyed by `"<METHOD> <path>"`.
    type Routes = HashMap<String, (u16, Vec<u8>)>;

    struct MockServer {
        addr: String,
        _handle: std::thread::JoinHandle<()>,
        requests: Arc<Mutex<Vec<CapturedRequest>>>,
    }

    impl MockServer {
        fn start(routes: Routes) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let addr = format!("http://{}", listener.local_addr().unwrap());
            let routes = Arc::new(routes);
            let requests: Arc<Mutex<Vec<CapturedRequest>>> = Arc::new(Mutex::new(Vec::new()));

            let requests_clone = Arc::clone(&requests);
            let handle = std::thread::spawn(move || {
                for stream in listener.incoming() {
                    let Ok(mut stream) = stream else { break };
                    let routes = Arc::clone(&routes);
                    let reqs = Arc::clone(&requests_clone);

                    std::thread::spawn(move || {
                        let mut reader = BufReader::new(stream.try_clone().unwrap());
                        let mut request_line = String::new();
                        if reader.read_line(&mut request_line).is_err() {
                            return;
                        }
                        let parts: Vec<&str> = request_line.trim().splitn(3, ' ').collect();
                        if parts.len() < 2 {
                            return;
                        }
                        let method = parts[0].to_owned();
                        let path = parts[1].to_owned();

                        let mut content_length: usize = 0;
                        let mut headers = HashMap::new();
                        loop {
                            let mut line = String::new();
                            if reader.read_line(&mut line).is_err() || line.trim().is_empty() {
                                break;
                            }
                            if let Some((k, v)) = line.trim().split_once(": ") {
                                headers.insert(k.to_lowercase(), v.to_owned());
                            }
                            let lower = line.to_lowercase();
                            if let Some(val) = lower.strip_prefix("content-length: ") {
                                content_length = val.trim().parse().unwrap_or(0);
                            }
                        }

                        let mut body = vec![0u8; content_length];
                        if content_length > 0 {
                            let _ = reader.read_exact(&mut body);
                        }

                        let key = format!("{method} {path}");
                        reqs.lock().unwrap().push(CapturedRequest {
                            method,
                            path,
                            headers,
                            body,
                        });

                        let (code, payload) = routes
                            .get(&key)
                            .cloned()
                            .unwrap_or((404, Vec::new()));
                        let reason = match code {
                            200 => "OK",
                            404 => "Not Found",
                            409 => "Conflict",
                            _ => "Error",
                        };
                        let head = format!(
                            "HTTP/1.1 {code} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                            payload.len()
                        );
                        let _ = stream.write_all(head.as_bytes());
                        let _ = stream.write_all(&payload);
                        let _ = stream.flush();
                    });
                }
            });

            MockServer {
                addr,
                _handle: handle,
                requests,
            }
        }

        fn captured_requests(&self) -> Vec<CapturedRequest> {
            // Let handler threads finish recording.
            std::thread::sleep(std::time::Duration::from_millis(50));
            self.requests.lock().unwrap().clone()
        }
    }

    fn route(routes: &mut Routes, key: &str, code: u16, body: &[u8]) {
        routes.insert(key.to_owned(), (code, body.to_vec()));
    }

    fn test_client(url: &str) -> HttpControlPlane {
        HttpControlPlane::new(RemoteConfig::new(url))
    }

    const APP_JSON: &[u8] = br#"{"generation":"2","locked":false,"name":"app1","release":"release1","router":"","status":"running","parameters":{"Foo":"bar"}}"#;

    #[test]
    fn http_app_get_decodes_app() {
        let mut routes = Routes::new();
        route(&mut routes, "GET /apps/app1", 200, APP_JSON);
        let server = MockServer::start(routes);

        let app = test_client(&server.addr).app_get("app1").unwrap();
        assert_eq!(app.name, "app1");
        assert_eq!(app.release, "release1");
        assert_eq!(app.parameters.get("Foo").map(String::as_str), Some("bar"));
    }

    #[test]
    fn path_segments_are_percent_encoded() {
        assert_eq!(api_path(&["apps", "app1"]), "/apps/app1");
        assert_eq!(
            api_path(&["apps", "a/b?c#d", "resources", "db 1"]),
            "/apps/a%2Fb%3Fc%23d/resources/db%201"
        );
        assert_eq!(api_path(&["x", "r\u{e9}"]), "/x/r%C3%A9");
    }

    #[test]
    fn http_app_name_cannot_escape_its_segment() {
        let mut routes = Routes::new();
        route(&mut routes, "GET /apps/app1%2Freleases", 200, APP_JSON);
        let server = MockServer::start(routes);

        let app = test_client(&server.addr).app_get("app1/releases").unwrap();
        assert_eq!(app.name, "app1");
        let reqs = server.captured_requests();
        assert_eq!(reqs[0].path, "/apps/app1%2Freleases");
    }

    #[test]
    fn http_missing_app_is_not_found() {
        let server = MockServer::start(Routes::new());
        let err = test_client(&server.addr).app_get("ghost").unwrap_err();
        assert!(err.is_not_found(), "got {err:?}");
    }

    #[test]
    fn http_conflict_maps_to_conflict() {
        let mut routes = Routes::new();
        route(&mut routes, "POST /apps", 409, b"");
        let server = MockServer::start(routes);

        let err = test_client(&server.addr)
            .app_create("app1", &AppCreateOptions::default())
            .unwrap_err();
        assert!(matches!(err, RemoteError::Conflict(_)), "got {err:?}");
    }

    #[test]
    fn http_server_error_maps_to_http() {
        let mut routes = Routes::new();
        route(&mut routes, "GET /apps/app1/resources", 500, b"err1");
        let server = MockServer::start(routes);

        let err = test_client(&server.addr).resource_list("app1").unwrap_err();
        assert!(matches!(err, RemoteError::Http(_)), "got {err:?}");
    }

    #[test]
    fn http_app_create_sends_name_and_generation() {
        let mut routes = Routes::new();
        route(&mut routes, "POST /apps", 200, APP_JSON);
        let server = MockServer::start(routes);

        let opts = AppCreateOptions {
            generation: Some("2".to_owned()),
        };
        test_client(&server.addr).app_create("app1", &opts).unwrap();

        let reqs = server.captured_requests();
        let body: serde_json::Value = serde_json::from_slice(&reqs[0].body).unwrap();
        assert_eq!(body["name"], "app1");
        assert_eq!(body["generation"], "2");
        assert_eq!(
            reqs[0].headers.get("content-type").map(String::as_str),
            Some("application/json")
        );
    }

    #[test]
    fn http_build_roundtrip_and_release_flow() {
        let mut routes = Routes::new();
        route(
            &mut routes,
            "POST /apps/app1/builds/import",
            200,
            br#"{"id":"build2","app":"app1","status":"complete"}"#,
        );
        route(&mut routes, "GET /apps/app1/builds/build1.tgz", 200, b"build");
        route(
            &mut routes,
            "POST /apps/app1/releases",
            200,
            br#"{"id":"release2","app":"app1","build":"build2","env":"ALPHA=one\n"}"#,
        );
        route(&mut routes, "POST /apps/app1/releases/release2/promote", 200, b"");
        let server = MockServer::start(routes);
        let client = test_client(&server.addr);

        let mut out = Vec::new();
        client.build_export("app1", "build1", &mut out).unwrap();
        assert_eq!(out, b"build");

        let build = client.build_import("app1", &mut &b"build"[..]).unwrap();
        assert_eq!(build.id, "build2");

        let release = client
            .release_create(
                "app1",
                &ReleaseCreateOptions {
                    build: Some(build.id.clone()),
                    env: Some("ALPHA=one\n".to_owned()),
                },
            )
            .unwrap();
        assert_eq!(release.id, "release2");
        client.release_promote("app1", "release2").unwrap();

        let reqs = server.captured_requests();
        let upload = reqs
            .iter()
            .find(|r| r.path == "/apps/app1/builds/import")
            .unwrap();
        assert_eq!(upload.body, b"build");
        let create = reqs.iter().find(|r| r.path == "/apps/app1/releases").unwrap();
        let body: serde_json::Value = serde_json::from_slice(&create.body).unwrap();
        assert_eq!(body["build"], "build2");
        assert_eq!(body["env"], "ALPHA=one\n");
    }

    #[test]
    fn http_resource_export_streams_payload() {
        let mut routes = Routes::new();
        route(
            &mut routes,
            "GET /apps/app1/resources",
            200,
            br#"[{"name":"resource1","type":"postgres"}]"#,
        );
        route(
            &mut routes,
            "GET /apps/app1/resources/resource1/data",
            200,
            b"resourcedata\n",
        );
        route(&mut routes, "PUT /apps/app2/resources/resource1/data", 200, b"");
        let server = MockServer::start(routes);
        let client = test_client(&server.addr);

        let resources = client.resource_list("app1").unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].kind, "postgres");

        let mut payload = Vec::new();
        client
            .resource_export("app1", "resource1")
            .unwrap()
            .read_to_end(&mut payload)
            .unwrap();
        assert_eq!(payload, b"resourcedata\n");

        client
            .resource_import("app2", "resource1", &mut &payload[..])
            .unwrap();
        let reqs = server.captured_requests();
        let put = reqs.iter().find(|r| r.method == "PUT").unwrap();
        assert_eq!(put.body, b"resourcedata\n");
    }

    #[test]
    fn http_requests_include_protocol_header() {
        let mut routes = Routes::new();
        route(&mut routes, "GET /apps/app1", 200, APP_JSON);
        route(&mut routes, "PUT /apps/app1", 200, b"");
        let server = MockServer::start(routes);
        let client = test_client(&server.addr);

        client.app_get("app1").unwrap();
        client
            .app_update("app1", &AppUpdateOptions::default())
            .unwrap();

        let reqs = server.captured_requests();
        assert_eq!(reqs.len(), 2);
        for req in &reqs {
            assert_eq!(
                req.headers.get("x-stevedore-protocol").map(String::as_str),
                Some("1"),
                "{} {} missing X-Stevedore-Protocol header",
                req.method,
                req.path
            );
            assert!(!req.headers.contains_key("authorization"));
        }
    }

    #[test]
    fn http_auth_token_sent_as_bearer_header() {
        let mut routes = Routes::new();
        route(&mut routes, "GET /apps/app1", 200, APP_JSON);
        let server = MockServer::start(routes);
        let client = HttpControlPlane::new(RemoteConfig::new(&server.addr).with_token("secret-token-42"));

        client.app_get("app1").unwrap();

        let reqs = server.captured_requests();
        assert_eq!(
            reqs[0].headers.get("authorization").map(String::as_str),
            Some("Bearer secret-token-42")
        );
    }

    #[test]
    fn http_connection_refused_returns_error() {
        let client = test_client("http://127.0.0.1:1");
        assert!(client.app_get("app1").is_err());
    }
}
