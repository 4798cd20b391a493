use std::sync::{Arc, Mutex};

use url::Url;

use crate::store::StringTable;

/// The blank-page URL is never obfuscated; it carries no information.
const BLANK_PAGE: &str = "about:blank";

/// Cache-preferential wrapper scheme: `wyciwyg://<n>/<inner-url>`.
const CACHE_WRAPPER_SCHEME: &str = "wyciwyg";

/// Obfuscates URLs component-by-component through the shared string table,
/// so that `http://server/path/to/resource` becomes
/// `http://<obf(server)>/<obf(path/to/resource)>`. Two URLs on the same host
/// share the host token while differing in path tokens, which keeps
/// correlation possible without revealing content.
#[derive(Clone)]
pub struct UrlObfuscator {
    table: Arc<Mutex<StringTable>>,
    enabled: bool,
}

impl UrlObfuscator {
    pub fn new(table: Arc<Mutex<StringTable>>, enabled: bool) -> Self {
        Self { table, enabled }
    }

    /// Obfuscate a single opaque string (page titles, search text, ...).
    pub fn obfuscate(&self, raw: &str) -> crate::error::Result<String> {
        if !self.enabled {
            return Ok(raw.to_string());
        }
        self.table.lock().unwrap().obfuscate(raw)
    }

    /// Obfuscate a URL, keeping scheme, port and the path's leading slash
    /// readable while replacing host, path remainder, query and fragment
    /// with independent surrogate ids.
    pub fn obfuscate_url(&self, raw: &str) -> crate::error::Result<String> {
        if raw.is_empty() || raw == BLANK_PAGE {
            return Ok(raw.to_string());
        }
        if !self.enabled {
            return Ok(raw.to_string());
        }

        let unwrapped = unwrap_cache_url(raw);
        let url = match Url::parse(unwrapped) {
            Ok(url) => url,
            // Not decomposable: obfuscate the whole string rather than
            // letting any part of it through
            Err(_) => return self.obfuscate(unwrapped),
        };

        let mut result = format!("{}://", url.scheme());
        // Hosts are case-insensitive; paths are not
        let host = url.host_str().unwrap_or("").to_lowercase();
        if !host.is_empty() {
            result.push_str(&self.obfuscate(&host)?);
        }
        if let Some(port) = url.port() {
            result.push_str(&format!(":{port}"));
        }

        let path = url.path();
        if !path.is_empty() {
            // Keep the leading separator readable; obfuscate the rest
            result.push_str(&path[..1]);
            if path.len() > 1 {
                result.push_str(&self.obfuscate(&path[1..])?);
            }
        }
        if let Some(query) = url.query() {
            if !query.is_empty() {
                result.push('?');
                result.push_str(&self.obfuscate(query)?);
            }
        }
        if let Some(fragment) = url.fragment() {
            if !fragment.is_empty() {
                result.push('#');
                result.push_str(&self.obfuscate(fragment)?);
            }
        }
        Ok(result)
    }
}

/// Strip the cache-preferential wrapper, returning the inner URL payload.
fn unwrap_cache_url(raw: &str) -> &str {
    let Some(rest) = raw.strip_prefix(&format!("{CACHE_WRAPPER_SCHEME}://")) else {
        return raw;
    };
    match rest.split_once('/') {
        Some((_, inner)) if !inner.is_empty() => inner,
        _ => raw,
    }
}
