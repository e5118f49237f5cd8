use parking_lot::Mutex;
use scene::UrlSink;
use streaming::Url;
use tracing::debug;

/// Page location held in memory. Every replacement overwrites the single
/// history entry.
#[derive(Debug)]
pub struct MemoryLocation {
    url: Mutex<Url>,
    replacements: Mutex<u64>,
}

impl MemoryLocation {
    pub fn parse(url: &str) -> Result<Self, String> {
        let url = Url::parse(url).map_err(|e| format!("invalid location {url:?}: {e}"))?;
        Ok(Self {
            url: Mutex::new(url),
            replacements: Mutex::new(0),
        })
    }

    pub fn replacements(&self) -> u64 {
        *self.replacements.lock()
    }
}

impl UrlSink for MemoryLocation {
    fn current(&self) -> Url {
        self.url.lock().clone()
    }

    fn replace(&self, url: Url) {
        debug!(%url, "history entry replaced");
        *self.url.lock() = url;
        *self.replacements.lock() += 1;
    }
}

#[cfg(test)]
mod tests {
    use scene::UrlSink;
    use streaming::Url;

    use super::MemoryLocation;

    #[test]
    fn replaces_in_place() {
        let location = MemoryLocation::parse("http://localhost/?tab=1").expect("url");
        location.replace(Url::parse("http://localhost/?tab=1&lat=1").expect("url"));
        assert_eq!(location.current().as_str(), "http://localhost/?tab=1&lat=1");
        assert_eq!(location.replacements(), 1);
    }

    #[test]
    fn rejects_relative_locations() {
        assert!(MemoryLocation::parse("/map?lat=1").is_err());
    }
}
