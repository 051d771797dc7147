use http::{HeaderMap, HeaderName, HeaderValue, Method, Version};

use crate::url::Target;
use crate::Error;

/// The GET request being sent, with the headers amended while preparing.
#[derive(Debug)]
pub(crate) struct AmendedRequest {
    method: Method,
    target: Target,
    headers: HeaderMap,
}

impl AmendedRequest {
    pub fn new(target: Target) -> Self {
        AmendedRequest {
            method: Method::GET,
            target,
            headers: HeaderMap::new(),
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn prelude(&self) -> (&Method, &str, Version) {
        (self.method(), self.target.path_and_query(), Version::HTTP_11)
    }

    pub fn set_header<K, V>(&mut self, key: K, value: V) -> Result<(), Error>
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        let name = HeaderName::try_from(key).map_err(|e| Error::BadHeader(e.into().to_string()))?;
        let value =
            HeaderValue::try_from(value).map_err(|e| Error::BadHeader(e.into().to_string()))?;
        self.headers.append(name, value);
        Ok(())
    }

    pub fn header(&self, name: &HeaderName) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    pub fn has_header(&self, name: &HeaderName) -> bool {
        self.headers.contains_key(name)
    }

    pub fn headers(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.headers.iter()
    }

    pub fn headers_len(&self) -> usize {
        self.headers.len()
    }

    /// Reorder so the headers derived from the target go first.
    pub fn prepend_headers(&mut self, first: HeaderMap) {
        let rest = std::mem::replace(&mut self.headers, first);
        let mut last_name = None;
        for (name, value) in rest {
            // HeaderMap::into_iter only yields the name for the first value.
            if let Some(n) = name {
                last_name = Some(n);
            }
            if let Some(n) = &last_name {
                self.headers.append(n.clone(), value);
            }
        }
    }

    /// A new target by combining the base from this request and a `location` header.
    pub fn new_target_from_location(&self, location: &str) -> Result<Target, Error> {
        self.target.join(location)
    }
}
