//! This module contains a parser for /proc/version
//!
//! Since the kernel version is not expected to change during a normal
//! performance measurement, this file is not meant for periodic sampling
//! like the others, but for a one-time readout that subsequently gets
//! re-used (e.g. to know which counters the kernel provides).
//!
//! The file is a single line of text:
//!
//! ```text
//! Linux version 6.1.0-13-amd64 (debian-kernel@lists.debian.org) (gcc-12 ...) #1 SMP PREEMPT_DYNAMIC Debian 6.1.55-1 (2023-09-29)
//! ```

use crate::error::{Error, ParseCause};
use crate::parser::PseudoFileParser;
use crate::splitter::parse_u64;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};


lazy_static! {
    /// Ultimately, the contents of /proc/version should match this regex
    static ref VERSION_REGEX: Regex = Regex::new(
        r"^(?P<os_type>\S+) version (?P<release>(?P<major>\d+)\.(?P<minor>\d+)(?:\.(?P<patch>\d+))?(?:-(?P<flavour>\S+)|\S*)) (?P<build_info>.+)$"
    ).expect("The version regex is valid");
}


/// Parser for /proc/version
#[derive(Debug, Default)]
pub struct VersionParser;
//
impl PseudoFileParser for VersionParser {
    type Data = KernelVersion;

    const PATH: &'static str = "version";

    fn parse(&mut self, contents: &[u8], errors: &mut Vec<Error>)
        -> KernelVersion
    {
        match KernelVersion::parse(contents) {
            Ok(version) => version,
            Err(cause) => {
                errors.push(Error::parse("version", cause));
                KernelVersion::default()
            },
        }
    }
}


/// Kernel versioning information
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelVersion {
    /// Operating system kernel, which is "Linux" for all we care
    pub os_type: String,

    /// Full release string (e.g. "6.1.0-13-amd64")
    pub release: String,

    /// Upstream kernel version, following Linux 3.x style
    ///
    /// Be warned that in the pre-3.0 era, these numbers actually had
    /// different semantics: the third "patch" number was used for feature
    /// releases, and a fourth version number was used for bugfixes. Linux
    /// 2.6 has long been unmaintained, so not fully supporting its
    /// versioning scheme is an acceptable compromise.
    ///
    pub major: u16,
    pub minor: u16,
    pub patch: u16,

    /// Distribution-specific versioning information and kernel flavours.
    /// Parsing this further would require an extensive study of
    /// distributions' kernel versioning schemes, so it is kept as-is.
    pub flavour: Option<String>,

    /// Build information (host, compiler, date...), kept unparsed
    pub build_info: String,
}
//
impl KernelVersion {
    /// Check if we are using at least a certain kernel version (included)
    pub fn greater_eq(&self, major: u16, minor: u16, patch: u16) -> bool {
        (self.major, self.minor, self.patch) >= (major, minor, patch)
    }

    /// Check if we are below a certain kernel version (excluded)
    pub fn smaller(&self, major: u16, minor: u16, patch: u16) -> bool {
        !self.greater_eq(major, minor, patch)
    }

    /// INTERNAL: Parse the contents of /proc/version
    fn parse(contents: &[u8]) -> Result<Self, ParseCause> {
        let text = std::str::from_utf8(contents).map_err(|_| {
            ParseCause::Unexpected(String::from_utf8_lossy(contents)
                                          .into_owned())
        })?;
        let text = text.trim_end();
        if text.is_empty() { return Err(ParseCause::MissingField); }
        let captures = VERSION_REGEX.captures(text).ok_or_else(|| {
            ParseCause::Unexpected(text.to_owned())
        })?;

        // Decode the upstream version numbers
        let number = |captures: &Captures, name: &str| {
            match captures.name(name) {
                Some(digits) => {
                    u16::try_from(parse_u64(digits.as_str().as_bytes())?)
                        .map_err(|_| ParseCause::Overflow)
                },
                None => Ok(0),
            }
        };
        let owned = |name: &str| captures.name(name)
                                         .map(|m| m.as_str().to_owned());

        Ok(Self {
            os_type: owned("os_type").unwrap_or_default(),
            release: owned("release").unwrap_or_default(),
            major: number(&captures, "major")?,
            minor: number(&captures, "minor")?,
            patch: number(&captures, "patch")?,
            flavour: owned("flavour"),
            build_info: owned("build_info").unwrap_or_default(),
        })
    }
}


/// Unit tests
#[cfg(test)]
mod tests {
    use crate::error::{Error, ParseCause};
    use crate::parser::PseudoFileParser;
    use crate::reader::ProcFileReader;
    use super::{KernelVersion, VersionParser};

    /// INTERNAL: Build info used by the tests below
    const BUILD_INFO: &str = "(gralouf@yolo) #1 Sat May 14 01:51:54 UTC 2048";

    /// INTERNAL: Parse a version string, assuming that it is valid
    fn parse(input: &str) -> KernelVersion {
        KernelVersion::parse(input.as_bytes()).unwrap()
    }

    /// INTERNAL: Expected parse of a version string
    fn expected(release: &str,
                (major, minor, patch): (u16, u16, u16),
                flavour: Option<&str>) -> KernelVersion {
        KernelVersion {
            os_type: String::from("Linux"),
            release: String::from(release),
            major,
            minor,
            patch,
            flavour: flavour.map(String::from),
            build_info: String::from(BUILD_INFO),
        }
    }

    /// Test the linux kernel version string parser
    #[test]
    fn parse_version() {
        // No patch version and no flavour
        assert_eq!(parse(&format!("Linux version 4.2 {}\n", BUILD_INFO)),
                   expected("4.2", (4, 2, 0), None));

        // A patch version, but no flavour
        assert_eq!(parse(&format!("Linux version 4.2.7 {}", BUILD_INFO)),
                   expected("4.2.7", (4, 2, 7), None));

        // A flavour, but no patch version
        assert_eq!(parse(&format!("Linux version 4.2-yeah {}", BUILD_INFO)),
                   expected("4.2-yeah", (4, 2, 0), Some("yeah")));

        // Both a flavour and a patch version
        assert_eq!(parse(&format!("Linux version 4.9.337-wooo {}",
                                  BUILD_INFO)),
                   expected("4.9.337-wooo", (4, 9, 337), Some("wooo")));

        // Some other kind of suffix
        assert_eq!(parse(&format!("Linux version 6.1.21+ {}", BUILD_INFO)),
                   expected("6.1.21+", (6, 1, 21), None));
    }

    /// Check that invalid version strings are reported
    #[test]
    fn invalid_version() {
        let mut errors = Vec::new();
        let version = VersionParser.parse(b"This is not a kernel", &mut errors);
        assert_eq!(version, KernelVersion::default());
        assert!(matches!(&errors[..], [Error::Parse {
            cause: ParseCause::Unexpected(_), ..
        }]));

        assert_eq!(KernelVersion::parse(b"\n"), Err(ParseCause::MissingField));
        assert_eq!(KernelVersion::parse(b"Linux version 99999.1 (x)"),
                   Err(ParseCause::Overflow));
    }

    /// Check that reading the kernel version string of the host works
    #[test]
    fn load_host_version() {
        let mut reader = ProcFileReader::open("/proc/version").unwrap();
        let mut errors = Vec::new();
        let version = reader.sample(|contents| {
            VersionParser.parse(contents, &mut errors)
        }).unwrap();
        assert!(errors.is_empty(), "Unexpected errors {:?}", errors);
        assert_eq!(version.os_type, "Linux");
        assert!(version.greater_eq(2, 6, 0));
    }

    /// Check that kernel version compatibility checks work
    #[test]
    fn check_version_compatibility() {
        // Let's build an arbitrary kernel version struct
        let version = KernelVersion {
            major: 4,
            minor: 2,
            patch: 5,
            ..KernelVersion::default()
        };

        // Check "greater than or equal" version constraint
        assert!(!version.greater_eq(4, 2, 6));
        assert!(version.greater_eq(4, 2, 5));
        assert!(version.greater_eq(4, 2, 4));
        assert!(!version.greater_eq(4, 3, 5));
        assert!(version.greater_eq(4, 1, 6));
        assert!(!version.greater_eq(5, 2, 5));
        assert!(version.greater_eq(3, 3, 6));

        // Check "smaller than" version constraint
        assert!(version.smaller(4, 2, 6));
        assert!(!version.smaller(4, 2, 5));
        assert!(version.smaller(4, 3, 5));
        assert!(!version.smaller(3, 3, 6));
    }
}
