//! Capability tables.
//!
//! Every instrument setting the driver understands belongs to one of four
//! closed families: measurement mode, standard observer, color space and
//! illuminant. Each family is a fixed, ordered [`CapabilityTable`] of
//! `(value, symbolic name, numeric code)` entries, so a name and its driver
//! code are declared exactly once.
//!
//! Lookups are case-sensitive exact matches. The two failure directions are
//! kept apart:
//!
//! - [`CapabilityError::NotFound`]: a caller supplied a name the family does
//!   not define (an input problem).
//! - [`CapabilityError::Unrecognized`]: the driver returned a code the
//!   family cannot name (driver/table skew, an internal problem).

use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─── Errors ─────────────────────────────────────────────────────────

/// Failure of a capability table lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    /// No entry carries the given symbolic name.
    #[error("unknown {family} '{name}'; known values are: {known}")]
    NotFound {
        /// Capability family searched.
        family: &'static str,
        /// Name that failed to match.
        name: String,
        /// Comma-separated list of accepted names.
        known: String,
    },

    /// No entry carries the given numeric code.
    #[error("driver returned unrecognized {family} code {code}")]
    Unrecognized {
        /// Capability family searched.
        family: &'static str,
        /// Code that failed to match.
        code: u32,
    },
}

// ─── Generic table ──────────────────────────────────────────────────

/// One row of a capability table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityEntry<T: 'static> {
    /// Typed value.
    pub value: T,
    /// Stable symbolic name.
    pub name: &'static str,
    /// Driver enumeration code.
    pub code: u32,
}

/// Fixed bidirectional map between symbolic names and driver codes.
#[derive(Debug)]
pub struct CapabilityTable<T: 'static> {
    family: &'static str,
    entries: &'static [CapabilityEntry<T>],
}

impl<T: Copy + PartialEq + 'static> CapabilityTable<T> {
    /// Build a table over a static entry list.
    pub const fn new(family: &'static str, entries: &'static [CapabilityEntry<T>]) -> Self {
        Self { family, entries }
    }

    /// Family name used in error messages ("measurement mode", ...).
    pub fn family(&self) -> &'static str {
        self.family
    }

    /// All entries in table order.
    pub fn entries(&self) -> &'static [CapabilityEntry<T>] {
        self.entries
    }

    /// Symbolic names in table order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|e| e.name)
    }

    /// Resolve a symbolic name to its driver code.
    pub fn code_for_name(&self, name: &str) -> Result<u32, CapabilityError> {
        self.entry_for_name(name).map(|e| e.code)
    }

    /// Resolve a driver code to its symbolic name.
    pub fn name_for_code(&self, code: u32) -> Result<&'static str, CapabilityError> {
        self.entry_for_code(code).map(|e| e.name)
    }

    /// Resolve a symbolic name to its typed value.
    pub fn value_for_name(&self, name: &str) -> Result<T, CapabilityError> {
        self.entry_for_name(name).map(|e| e.value)
    }

    /// Resolve a driver code to its typed value.
    pub fn value_for_code(&self, code: u32) -> Result<T, CapabilityError> {
        self.entry_for_code(code).map(|e| e.value)
    }

    fn entry_for_name(&self, name: &str) -> Result<&'static CapabilityEntry<T>, CapabilityError> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| CapabilityError::NotFound {
                family: self.family,
                name: name.to_string(),
                known: self.names().collect::<Vec<_>>().join(", "),
            })
    }

    fn entry_for_code(&self, code: u32) -> Result<&'static CapabilityEntry<T>, CapabilityError> {
        self.entries
            .iter()
            .find(|e| e.code == code)
            .ok_or(CapabilityError::Unrecognized {
                family: self.family,
                code,
            })
    }
}

/// A closed capability family backed by a static [`CapabilityTable`].
pub trait Capability: Copy + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// The family's table.
    fn table() -> &'static CapabilityTable<Self>;

    /// Stable symbolic name of this value.
    fn name(self) -> &'static str;

    /// Driver enumeration code of this value.
    fn code(self) -> u32;

    /// Decode a driver code.
    fn from_code(code: u32) -> Result<Self, CapabilityError> {
        Self::table().value_for_code(code)
    }

    /// Resolve a symbolic name.
    fn from_name(name: &str) -> Result<Self, CapabilityError> {
        Self::table().value_for_name(name)
    }
}

const fn entry<T>(value: T, name: &'static str, code: u32) -> CapabilityEntry<T> {
    CapabilityEntry { value, name, code }
}

/// Declare a family enum, its table and its [`Capability`] impl from one
/// `Variant = ("name", code)` listing. `name()` and `code()` are exhaustive
/// matches over the same listing the table is built from.
macro_rules! capability_family {
    (
        $(#[$meta:meta])*
        pub enum $ty:ident in $table:ident ($family:literal) {
            $(
                $(#[$vmeta:meta])*
                $variant:ident = ($name:literal, $code:literal)
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "&'static str")]
        pub enum $ty {
            $(
                $(#[$vmeta])*
                $variant,
            )+
        }

        static $table: CapabilityTable<$ty> = CapabilityTable::new(
            $family,
            &[$(entry($ty::$variant, $name, $code)),+],
        );

        impl Capability for $ty {
            fn table() -> &'static CapabilityTable<Self> {
                &$table
            }

            fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }

            fn code(self) -> u32 {
                match self {
                    $(Self::$variant => $code,)+
                }
            }
        }
    };
}

// ─── Families ───────────────────────────────────────────────────────

capability_family! {
    /// Instrument measurement mode.
    pub enum MeasurementMode in MEASUREMENT_MODES ("measurement mode") {
        /// No mode selected yet.
        #[default]
        Undefined = ("undefined", 0),
        /// Self-luminous sources (displays, projectors).
        Emissive = ("emissive", 1),
        /// Incident light through a diffuser.
        Ambient = ("ambient", 2),
        /// Reflective samples lit by the instrument lamp.
        Reflective = ("reflective", 3),
    }
}

capability_family! {
    /// CIE standard observer.
    pub enum Observer in OBSERVERS ("observer") {
        /// CIE 1931 2° observer.
        #[default]
        TwoDegree1931 = ("two-degree-1931", 1),
        /// CIE 1964 10° observer.
        TenDegree1964 = ("ten-degree-1964", 2),
    }
}

capability_family! {
    /// Color space in which colorimetry is reported.
    pub enum ColorSpace in COLOR_SPACES ("color space") {
        /// CIE 1976 L*a*b*.
        CieLab = ("CIELab", 0),
        /// L*C*h°, the cylindrical form of L*a*b*.
        CieLch = ("CIELCh", 1),
        /// CIE 1976 L*u*v*.
        CieLuv = ("CIELuv", 2),
        /// L*C*h°(uv), the cylindrical form of L*u*v*.
        CieLchUv = ("CIELChuv", 3),
        /// CIE 1960 UCS chromaticity with luminance.
        CieUvY1960 = ("CIE-uv-Y1960", 4),
        /// CIE 1976 UCS chromaticity with luminance.
        CieUPrimeVPrimeY1976 = ("CIE-u'v'-Y1976", 5),
        /// CIE 1931 XYZ tristimulus.
        #[default]
        CieXyz = ("CIEXYZ", 6),
        /// CIE 1931 xy chromaticity with luminance.
        CieXyY = ("CIExyY", 7),
    }
}

capability_family! {
    /// Illuminant used to derive colorimetry from spectral data.
    pub enum Illuminant in ILLUMINANTS ("illuminant") {
        /// Incandescent tungsten, 2856 K.
        A = ("A", 0),
        /// Direct noon sunlight (deprecated by CIE).
        B = ("B", 1),
        /// Average daylight (deprecated by CIE).
        C = ("C", 2),
        /// Horizon daylight, 5003 K.
        D50 = ("D50", 3),
        /// Mid-morning daylight, 5503 K.
        D55 = ("D55", 4),
        /// Noon daylight, 6504 K.
        #[default]
        D65 = ("D65", 5),
        /// North sky daylight, 7504 K.
        D75 = ("D75", 6),
        /// Cool white fluorescent.
        F2 = ("F2", 7),
        /// Broadband daylight fluorescent.
        F7 = ("F7", 8),
        /// Narrow tri-band fluorescent.
        F11 = ("F11", 9),
        /// Measure the source itself, no reference illuminant.
        Emission = ("Emission", 10),
    }
}

// ─── String conversions via the table ───────────────────────────────

macro_rules! impl_capability_conversions {
    ($($ty:ty),* $(,)?) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(Capability::name(*self))
                }
            }

            impl FromStr for $ty {
                type Err = CapabilityError;
                fn from_str(s: &str) -> Result<Self, Self::Err> {
                    <$ty as Capability>::from_name(s)
                }
            }

            impl TryFrom<String> for $ty {
                type Error = CapabilityError;
                fn try_from(s: String) -> Result<Self, Self::Error> {
                    s.parse()
                }
            }

            impl From<$ty> for &'static str {
                fn from(value: $ty) -> Self {
                    Capability::name(value)
                }
            }
        )*
    };
}

impl_capability_conversions!(MeasurementMode, Observer, ColorSpace, Illuminant);

/// Symbolic names of every family, for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilityNames {
    /// Measurement mode names.
    pub measurement_modes: Vec<&'static str>,
    /// Observer names.
    pub observers: Vec<&'static str>,
    /// Color space names.
    pub color_spaces: Vec<&'static str>,
    /// Illuminant names.
    pub illuminants: Vec<&'static str>,
}

impl CapabilityNames {
    /// Collect the names of all four families.
    pub fn all() -> Self {
        Self {
            measurement_modes: MeasurementMode::table().names().collect(),
            observers: Observer::table().names().collect(),
            color_spaces: ColorSpace::table().names().collect(),
            illuminants: Illuminant::table().names().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_round_trip<T: Capability>() {
        let table = T::table();
        for name in table.names() {
            let code = table.code_for_name(name).unwrap();
            assert_eq!(table.name_for_code(code).unwrap(), name);
        }
        for e in table.entries() {
            assert_eq!(e.value.name(), e.name);
            assert_eq!(e.value.code(), e.code);
            assert_eq!(T::from_code(e.code).unwrap(), e.value);
        }
    }

    fn assert_unique<T: Capability>() {
        let table = T::table();
        let names: std::collections::HashSet<_> = table.names().collect();
        let codes: std::collections::HashSet<_> = table.entries().iter().map(|e| e.code).collect();
        assert_eq!(names.len(), table.entries().len());
        assert_eq!(codes.len(), table.entries().len());
    }

    #[test]
    fn test_round_trip_all_families() {
        assert_round_trip::<MeasurementMode>();
        assert_round_trip::<Observer>();
        assert_round_trip::<ColorSpace>();
        assert_round_trip::<Illuminant>();
    }

    #[test]
    fn test_names_and_codes_unique() {
        assert_unique::<MeasurementMode>();
        assert_unique::<Observer>();
        assert_unique::<ColorSpace>();
        assert_unique::<Illuminant>();
    }

    #[test]
    fn test_defaults_carry_listed_codes() {
        assert_eq!(MeasurementMode::default().code(), 0);
        assert_eq!(Observer::default().code(), 1);
        assert_eq!(ColorSpace::default().name(), "CIEXYZ");
        assert_eq!(Illuminant::default().code(), 5);
        assert_eq!(Illuminant::Emission.code(), 10);
    }

    #[test]
    fn test_table_sizes() {
        assert_eq!(MeasurementMode::table().entries().len(), 4);
        assert_eq!(Observer::table().entries().len(), 2);
        assert_eq!(ColorSpace::table().entries().len(), 8);
        assert_eq!(Illuminant::table().entries().len(), 11);
    }

    #[test]
    fn test_unknown_name_is_not_found() {
        let err = ColorSpace::table().code_for_name("Bogus").unwrap_err();
        assert!(matches!(err, CapabilityError::NotFound { family: "color space", .. }));
        assert!(err.to_string().contains("CIEXYZ"));
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        assert!(MeasurementMode::table().code_for_name("Emissive").is_err());
        assert!(ColorSpace::table().code_for_name("cielab").is_err());
        assert!(Illuminant::table().code_for_name("d65").is_err());
        assert_eq!(Illuminant::table().code_for_name("D65"), Ok(5));
    }

    #[test]
    fn test_unknown_code_is_unrecognized() {
        let err = Illuminant::table().name_for_code(42).unwrap_err();
        assert_eq!(
            err,
            CapabilityError::Unrecognized {
                family: "illuminant",
                code: 42
            }
        );
        // Observer codes start at 1.
        assert!(Observer::from_code(0).is_err());
    }

    #[test]
    fn test_from_str_and_display() {
        let cs: ColorSpace = "CIE-u'v'-Y1976".parse().unwrap();
        assert_eq!(cs, ColorSpace::CieUPrimeVPrimeY1976);
        assert_eq!(cs.to_string(), "CIE-u'v'-Y1976");
        assert_eq!("ten-degree-1964".parse::<Observer>(), Ok(Observer::TenDegree1964));
        assert!("".parse::<MeasurementMode>().is_err());
    }

    #[test]
    fn test_serde_uses_symbolic_names() {
        #[derive(Debug, Serialize, Deserialize, PartialEq)]
        struct Wrapper {
            mode: MeasurementMode,
            illuminant: Illuminant,
        }

        let w = Wrapper {
            mode: MeasurementMode::Reflective,
            illuminant: Illuminant::Emission,
        };
        let text = toml::to_string(&w).unwrap();
        assert!(text.contains("\"reflective\""));
        assert!(text.contains("\"Emission\""));
        assert_eq!(toml::from_str::<Wrapper>(&text).unwrap(), w);

        let bad = toml::from_str::<Wrapper>("mode = \"REFLECTIVE\"\nilluminant = \"D65\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_capability_names_all() {
        let names = CapabilityNames::all();
        assert_eq!(names.measurement_modes[0], "undefined");
        assert_eq!(names.illuminants.last(), Some(&"Emission"));
        assert_eq!(names.color_spaces.len(), 8);
    }
}
