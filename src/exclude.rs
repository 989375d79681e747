// src/exclude.rs

//! Exclusion policy
//!
//! By default a package (or library) name is excluded when any entry of the
//! list is a substring of it, so "libssl1.1" also excludes "libssl1.1-dev".
//! The legacy scripts tested the other direction (the name contained in an
//! entry); that is available as [`MatchPolicy::NameInEntry`].
//! A name excluded only through a substring match, with no exact entry,
//! is an *accidental* exclusion and is reported by the reconciler.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Packages skipped by the symbol-repository pipeline
pub const SYMBOL_EXCLUDES: &[&str] = &["libgcc1", "gcc-8-base", "<debconf-2.0>", "debconf"];

/// Libraries that are always present at runtime and never followed
pub const LDD_EXCLUDES: &[&str] = &["ld-linux-x86-64.so.2", "libdl.so.2", "libpthread.so.0"];

/// Packages skipped by the source-build pipeline
pub const SOURCE_EXCLUDES: &[&str] = &[
    "libc6",
    "libgcc1",
    "gcc-7-base",
    "gcc-8-base",
    "<debconf-2.0>",
    "debconf",
    "libselinux1",
    "libzstd1",
    "libstdc++6",
    "dpkg",
    "tar",
    "perl-base",
    "install-info",
    "ibdc1394-22",
    "libelf1",
    "libgdk-pixbuf2.0-bin",
    "libgdk-pixbuf2.0-0",
    "libgdk-pixbuf2.0-common",
    "libqt5core5a",
    "libqt5network5",
    "libqt5dbus5",
    "libqt5svg5",
    "libqt5x11extras5",
    "libllvm5.0",
    "libllvm6.0",
    "libllvm7",
    "libgomp1",
    "libbluray2",
    "python2.7",
    "python",
    "python2.7-minimal",
    "libqt5gui5",
    "libqt5widgets5",
    "qt5-gtk-platformtheme",
    "qttranslations5-l10n",
    "cpp",
    "cpp-7",
    "cpp-8",
    "adduser",
    "ca-certificates",
    "fonts-liberation",
    "gpgv",
    "gsettings-desktop-schemas",
    "hicolor-icon-theme",
    "gpgv1",
    "gpgv2",
    "adwaita-icon-theme",
    "cdebconf",
    "debconf-i18n",
    "debian-archive-keyring",
    "dmsetup",
    "fonts-freefont-ttf",
    "glib-networking",
    "glib-networking-common",
    "glib-networking-services",
    "i965-va-driver",
    "libatk1.0-0",
    "libatk1.0-data",
    "libauthen-sasl-perl",
    "libdata-dump-perl",
    "libdc1394-22",
    "libencode-locale-perl",
    "libfile-basedir-perl",
    "libdevmapper1.02.1",
    "intel-media-va-driver",
    "libfile-desktopentry-perl",
    "libfile-listing-perl",
    "libfile-mimeinfo-perl",
    "libfont-afm-perl",
    "libgdbm-compat4",
    "libgdbm6",
    "libhtml-form-perl",
    "libhtml-format-perl",
    "libhtml-parser-perl",
    "libhtml-tagset-perl",
    "libhtml-tree-perl",
    "libhttp-cookies-perl",
    "libhttp-daemon-perl",
    "libhttp-date-perl",
    "libhttp-message-perl",
    "libhttp-negotiate-perl",
    "libio-html-perl",
    "libio-socket-inet6-perl",
    "libio-socket-ip-perl",
    "libio-socket-ssl-perl",
    "libio-stringy-perl",
    "libipc-system-simple-perl",
    "liblocale-gettext-perl",
    "liblwp-mediatypes-perl",
    "liblwp-protocol-https-perl",
    "libmailtools-perl",
    "libnet-dbus-perl",
    "libnet-http-perl",
    "libnet-idn-encode-perl",
    "libnet-libidn-perl",
    "libnet-smtp-ssl-perl",
    "libnet-ssleay-perl",
    "libperl5.26",
    "libperl5.28",
    "libpython-stdlib",
    "libpython2-stdlib",
    "publicsuffix",
    "python-minimal",
    "samba-libs",
    "libpython2.7",
    "libpython2.7-stdlib",
    "libpython2.7-minimal",
    "libscalar-list-utils-perl",
    "libsocket-perl",
    "libsocket6-perl",
    "libtext-charwidth-perl",
    "libtext-iconv-perl",
    "libtext-wrapi18n-perl",
    "libtie-ixhash-perl",
    "libtimedate-perl",
    "libtry-tiny-perl",
    "liburi-perl",
    "libwww-perl",
    "libwww-robotrules-perl",
    "libx11-protocol-perl",
    "libxml-parser-perl",
    "libxml-twig-perl",
    "libxml-xpath-perl",
    "libxml-xpathengine-perl",
    "login",
    "mime-support",
    "netbase",
    "notification-daemon",
    "passwd",
    "perl-modules-5.26",
    "perl-modules-5.28",
    "x11-utils",
    "x11-xserver-utils",
    "xdg-user-dirs",
    "xdg-utils",
    "shared-mime-info",
    "perl",
    "dbus",
];

/// Direction of the substring test
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum MatchPolicy {
    /// An entry occurring inside the name excludes it
    #[default]
    EntryInName,
    /// The name occurring inside an entry excludes it
    NameInEntry,
}

/// A list of exclusion entries with substring matching
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionList {
    entries: Vec<String>,
    policy: MatchPolicy,
}

impl ExclusionList {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(Into::into).collect(),
            policy: MatchPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: MatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn symbol_defaults() -> Self {
        Self::new(SYMBOL_EXCLUDES.iter().copied())
    }

    pub fn source_defaults() -> Self {
        Self::new(SOURCE_EXCLUDES.iter().copied())
    }

    pub fn ldd_defaults() -> Self {
        Self::new(LDD_EXCLUDES.iter().copied())
    }

    /// Substring test in the configured direction
    pub fn excludes(&self, name: &str) -> bool {
        match self.policy {
            MatchPolicy::EntryInName => self.entries.iter().any(|e| name.contains(e.as_str())),
            MatchPolicy::NameInEntry => self.entries.iter().any(|e| e.contains(name)),
        }
    }

    /// True if `name` is itself an entry
    pub fn excludes_exactly(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e == name)
    }

    /// Excluded only through a substring match
    pub fn is_accidental(&self, name: &str) -> bool {
        self.excludes(name) && !self.excludes_exactly(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}
