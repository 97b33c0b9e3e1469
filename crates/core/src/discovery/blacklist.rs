use autoroute_api::RemoteResponse;
use regex::Regex;
use std::sync::LazyLock;

static ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<address[^>]*>(.*?)</address>").expect("valid regex"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

/// Recognizes reverse proxies that answer for content they do not have.
#[derive(Debug, Clone)]
pub struct Blacklist {
    headers: Vec<String>,
    server_names: Vec<String>,
}

impl Blacklist {
    pub fn new(headers: &[String], server_names: &[String]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_ascii_lowercase()).collect(),
            server_names: server_names.to_vec(),
        }
    }

    /// Returns why the remote behind `root` is unusable, if it is.
    pub fn check(&self, root: &RemoteResponse) -> Option<String> {
        if let Some(header) = self.headers.iter().find(|h| root.header(h).is_some()) {
            return Some(format!(
                "Remote is not supported by automatic routing (response carries '{header}' header)."
            ));
        }
        let body = root.body_text();
        let address = ADDRESS.captures(&body)?.get(1)?.as_str();
        let address = TAG.replace_all(address, "");
        let address = address.trim();
        self.server_names
            .iter()
            .find(|name| address.starts_with(name.as_str()))
            .map(|name| format!("Remote is not supported by automatic routing (served by {name})."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blacklist() -> Blacklist {
        Blacklist::new(&["X-Artifactory-Id".to_string()], &["Artifactory".to_string()])
    }

    #[test]
    fn test_signature_header() {
        let response = RemoteResponse::new(200).with_header("X-Artifactory-Id", "abc");
        assert!(blacklist().check(&response).is_some());
    }

    #[test]
    fn test_address_element() {
        let body = "<html><body><address>Artifactory/2.6.5 Server at repo Port 80</address></body></html>";
        let response = RemoteResponse::new(200).with_body(body);
        assert!(blacklist().check(&response).is_some());

        let body = "<html><body><address><i>Apache/2.4</i> Server</address></body></html>";
        let response = RemoteResponse::new(200).with_body(body);
        assert!(blacklist().check(&response).is_none());
    }

    #[test]
    fn test_plain_remote_passes() {
        let response = RemoteResponse::new(200).with_header("server", "nginx");
        assert!(blacklist().check(&response).is_none());
    }
}
