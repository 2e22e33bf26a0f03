//! The fixed set of package registries and how each one is queried.

use std::fmt;
use std::str::FromStr;

use tracing::debug;
use url::Url;

use crate::dispatch::Checker;
use crate::probe::{ProbeError, Signal, Transport, classify};

/// A public package registry that can be asked whether a name exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[non_exhaustive]
pub enum Registry {
    /// Python Package Index.
    PyPI,
    /// npm public registry.
    Npm,
    /// RubyGems.org.
    RubyGems,
    /// Maven Central, via its Solr search API.
    Maven,
    /// NuGet Gallery.
    NuGet,
    /// Packagist (Composer).
    Packagist,
    /// Homebrew core formulae.
    Homebrew,
    /// Debian package tracker.
    Apt,
}

impl Registry {
    /// Every registry, in reporting order.
    pub const ALL: [Registry; 8] = [
        Self::PyPI,
        Self::Npm,
        Self::RubyGems,
        Self::Maven,
        Self::NuGet,
        Self::Packagist,
        Self::Homebrew,
        Self::Apt,
    ];

    /// Label used as the key in a [`ResultSet`](crate::dispatch::ResultSet).
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::PyPI => "PyPI",
            Self::Npm => "npm",
            Self::RubyGems => "RubyGems",
            Self::Maven => "Maven",
            Self::NuGet => "NuGet",
            Self::Packagist => "Packagist",
            Self::Homebrew => "Homebrew",
            Self::Apt => "APT",
        }
    }

    /// The existence rule this registry's responses follow.
    #[must_use]
    pub fn signal(self) -> Signal {
        match self {
            Self::Maven => Signal::MavenNumFound,
            _ => Signal::StatusNot404,
        }
    }

    /// Build the lookup URL for `name`.
    ///
    /// The name is percent-encoded as a path segment (or query value for
    /// Maven), so it can never change which resource is requested. A name
    /// that would land as an empty, `.` or `..` segment is refused rather
    /// than collapsed into its parent path. Packagist names keep their
    /// `vendor/package` slash; NuGet ids are lowercased as the registration
    /// API requires.
    ///
    /// ```
    /// use name_avail::registry::Registry;
    ///
    /// let url = Registry::PyPI.url("requests").unwrap();
    /// assert_eq!(url.as_str(), "https://pypi.org/pypi/requests/json");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::InvalidUrl`] if the URL cannot be assembled or
    /// the name is not usable as a path segment.
    pub fn url(self, name: &str) -> Result<Url, ProbeError> {
        match self {
            Self::PyPI => join("https://pypi.org/pypi/", [name, "json"]),
            Self::Npm => join("https://registry.npmjs.org/", [name]),
            Self::RubyGems => join(
                "https://rubygems.org/api/v1/gems/",
                [format!("{name}.json")],
            ),
            Self::Maven => Url::parse_with_params(
                "https://search.maven.org/solrsearch/select",
                &[("q", name), ("rows", "1"), ("wt", "json")],
            )
            .map_err(|e| ProbeError::InvalidUrl(e.to_string())),
            Self::NuGet => {
                let id = name.to_lowercase();
                join(
                    "https://api.nuget.org/v3/registration3/",
                    [id.as_str(), "index.json"],
                )
            }
            Self::Packagist => {
                let (vendor, package) = match name.rsplit_once('/') {
                    Some((vendor, package)) => (Some(vendor), package),
                    None => (None, name),
                };
                let file = format!("{package}.json");
                join(
                    "https://packagist.org/packages/",
                    vendor.into_iter().chain([file.as_str()]),
                )
            }
            Self::Homebrew => join(
                "https://formulae.brew.sh/api/formula/",
                [format!("{name}.json")],
            ),
            Self::Apt => join("https://tracker.debian.org/pkg/", [name]),
        }
    }

    /// Ask this registry whether `name` exists: one GET, then [`classify`].
    ///
    /// # Errors
    ///
    /// Any [`ProbeError`] raised while building the URL, fetching it, or
    /// interpreting the response.
    pub fn probe(self, transport: &dyn Transport, name: &str) -> Result<bool, ProbeError> {
        let url = self.url(name)?;
        let signal = self.signal();
        debug!(registry = self.name(), %url, "probing");
        let response = transport.get(url.as_str(), signal.needs_body())?;
        classify(signal, &response)
    }
}

impl fmt::Display for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A registry label that matches none of [`Registry::ALL`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown registry `{0}`")]
pub struct UnknownRegistry(pub String);

impl FromStr for Registry {
    type Err = UnknownRegistry;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownRegistry(s.to_owned()))
    }
}

// `PathSegmentsMut::extend` silently drops `.` and `..`, and an empty
// segment leaves a trailing slash, so all three are refused up front.
fn join<I>(base: &str, segments: I) -> Result<Url, ProbeError>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let segments: Vec<I::Item> = segments.into_iter().collect();
    if let Some(bad) = segments
        .iter()
        .map(|seg| AsRef::<str>::as_ref(seg))
        .find(|seg| matches!(*seg, "" | "." | ".."))
    {
        return Err(ProbeError::InvalidUrl(format!(
            "`{bad}` is not a usable path segment"
        )));
    }
    let mut url = Url::parse(base).map_err(|e| ProbeError::InvalidUrl(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|()| ProbeError::InvalidUrl(base.to_owned()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// The static checker table: one [`Checker`] per registry, all sharing
/// `transport`.
///
/// ```no_run
/// use name_avail::dispatch::dispatch;
/// use name_avail::probe::Client;
/// use name_avail::registry::checkers;
///
/// let client = Client::new();
/// let results = dispatch("left-pad-9x7z", &checkers(&client));
/// assert_eq!(results.len(), 8);
/// ```
#[must_use]
pub fn checkers(transport: &dyn Transport) -> Vec<Checker<'_>> {
    Registry::ALL
        .into_iter()
        .map(|registry| {
            Checker::new(registry.name(), move |name: &str| {
                registry.probe(transport, name)
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::Response;
    use std::sync::Mutex;

    fn url(registry: Registry, name: &str) -> String {
        registry.url(name).unwrap().to_string()
    }

    #[test]
    fn urls_match_registry_endpoints() {
        assert_eq!(url(Registry::PyPI, "flask"), "https://pypi.org/pypi/flask/json");
        assert_eq!(url(Registry::Npm, "react"), "https://registry.npmjs.org/react");
        assert_eq!(
            url(Registry::RubyGems, "rails"),
            "https://rubygems.org/api/v1/gems/rails.json"
        );
        assert_eq!(
            url(Registry::Maven, "guava"),
            "https://search.maven.org/solrsearch/select?q=guava&rows=1&wt=json"
        );
        assert_eq!(
            url(Registry::NuGet, "Newtonsoft.Json"),
            "https://api.nuget.org/v3/registration3/newtonsoft.json/index.json"
        );
        assert_eq!(
            url(Registry::Packagist, "monolog/monolog"),
            "https://packagist.org/packages/monolog/monolog.json"
        );
        assert_eq!(
            url(Registry::Homebrew, "wget"),
            "https://formulae.brew.sh/api/formula/wget.json"
        );
        assert_eq!(url(Registry::Apt, "curl"), "https://tracker.debian.org/pkg/curl");
    }

    #[test]
    fn names_cannot_escape_their_segment() {
        assert_eq!(
            url(Registry::PyPI, "a b?x#y"),
            "https://pypi.org/pypi/a%20b%3Fx%23y/json"
        );
        assert_eq!(
            url(Registry::Npm, "@babel/core"),
            "https://registry.npmjs.org/@babel%2Fcore"
        );
    }

    #[test]
    fn dot_segments_are_refused_not_collapsed() {
        for name in [".", ".."] {
            for registry in [Registry::PyPI, Registry::Npm, Registry::NuGet, Registry::Apt] {
                match registry.url(name) {
                    Err(ProbeError::InvalidUrl(msg)) => assert!(msg.contains(name), "{msg}"),
                    other => panic!("{registry} {name:?}: expected InvalidUrl, got {other:?}"),
                }
            }
        }
        assert!(matches!(
            Registry::Packagist.url("../monolog"),
            Err(ProbeError::InvalidUrl(_))
        ));
        assert!(matches!(
            Registry::Npm.url(""),
            Err(ProbeError::InvalidUrl(_))
        ));
    }

    #[test]
    fn dots_inside_a_file_name_are_kept() {
        assert_eq!(
            url(Registry::Homebrew, ".."),
            "https://formulae.brew.sh/api/formula/...json"
        );
        assert_eq!(
            url(Registry::PyPI, "..."),
            "https://pypi.org/pypi/.../json"
        );
    }

    #[test]
    fn dot_name_fails_the_checker_without_a_request() {
        let transport = Recording {
            seen: Mutex::new(Vec::new()),
            response: Response::status(200),
        };
        assert!(matches!(
            Registry::Npm.probe(&transport, ".."),
            Err(ProbeError::InvalidUrl(_))
        ));
        assert!(transport.seen.into_inner().unwrap().is_empty());
    }

    #[test]
    fn maven_name_is_query_encoded() {
        assert_eq!(
            url(Registry::Maven, "a&rows=99"),
            "https://search.maven.org/solrsearch/select?q=a%26rows%3D99&rows=1&wt=json"
        );
    }

    #[test]
    fn labels_are_unique() {
        let mut names: Vec<_> = Registry::ALL.iter().map(|r| r.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Registry::ALL.len());
    }

    #[test]
    fn from_str_ignores_case() {
        assert_eq!("apt".parse::<Registry>(), Ok(Registry::Apt));
        assert_eq!("PYPI".parse::<Registry>(), Ok(Registry::PyPI));
        assert_eq!(
            "cargo".parse::<Registry>(),
            Err(UnknownRegistry("cargo".to_owned()))
        );
    }

    #[test]
    fn only_maven_reads_the_body() {
        for registry in Registry::ALL {
            assert_eq!(
                registry.signal().needs_body(),
                registry == Registry::Maven,
                "{registry}"
            );
        }
    }

    struct Recording {
        seen: Mutex<Vec<(String, bool)>>,
        response: Response,
    }

    impl Transport for Recording {
        fn get(&self, url: &str, read_body: bool) -> Result<Response, ProbeError> {
            self.seen.lock().unwrap().push((url.to_owned(), read_body));
            Ok(self.response.clone())
        }
    }

    #[test]
    fn probe_issues_exactly_one_request() {
        let transport = Recording {
            seen: Mutex::new(Vec::new()),
            response: Response::status(404),
        };
        assert!(!Registry::Homebrew.probe(&transport, "nope").unwrap());
        let seen = transport.seen.into_inner().unwrap();
        assert_eq!(
            seen,
            vec![("https://formulae.brew.sh/api/formula/nope.json".to_owned(), false)]
        );
    }

    #[test]
    fn checker_table_covers_every_registry() {
        let transport = Recording {
            seen: Mutex::new(Vec::new()),
            response: Response::status(200),
        };
        let table = checkers(&transport);
        let names: Vec<_> = table.iter().map(Checker::name).collect();
        let expected: Vec<_> = Registry::ALL.iter().map(|r| r.name()).collect();
        assert_eq!(names, expected);
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn path_names_stay_inside_the_host(name in "[ -~]{1,40}") {
                for registry in Registry::ALL {
                    let built = match registry.url(&name) {
                        Ok(built) => built,
                        Err(ProbeError::InvalidUrl(_)) => {
                            prop_assert!(registry != Registry::Maven);
                            continue;
                        }
                        Err(other) => return Err(TestCaseError::fail(format!("{other:?}"))),
                    };
                    prop_assert_eq!(built.scheme(), "https");
                    prop_assert!(built.fragment().is_none());
                    if registry != Registry::Maven {
                        prop_assert!(built.query().is_none());
                    }
                }
            }

            #[test]
            fn own_segment_keeps_its_place(name in "[ -~]{1,40}") {
                prop_assume!(!matches!(name.as_str(), "." | ".."));
                for (registry, segments, at) in [
                    (Registry::PyPI, 3, 1),
                    (Registry::Npm, 1, 0),
                    (Registry::Apt, 2, 1),
                ] {
                    let built = registry.url(&name).unwrap();
                    let path: Vec<&str> = built.path_segments().unwrap().collect();
                    prop_assert_eq!(path.len(), segments, "{}", built);
                    prop_assert!(!matches!(path[at], "" | "." | ".."), "{}", built);
                }
            }

            #[test]
            fn plain_names_survive_verbatim(name in "[a-z0-9][a-z0-9._-]{0,30}") {
                let pypi = Registry::PyPI.url(&name).unwrap();
                prop_assert_eq!(pypi.path_segments().unwrap().nth(1), Some(name.as_str()));
                let apt = Registry::Apt.url(&name).unwrap();
                prop_assert_eq!(apt.path_segments().unwrap().nth(1), Some(name.as_str()));
                let npm = Registry::Npm.url(&name).unwrap();
                prop_assert_eq!(npm.path_segments().unwrap().next(), Some(name.as_str()));
            }
        }
    }
}
