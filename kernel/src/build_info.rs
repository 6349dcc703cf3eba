// Build Metadata and Versioning
//
// Compile-time identity of the kernel: name, version, tagline and build
// date. The portable banner and the shell's `version` command both read
// `BANNER`, so changing the identity means editing the one macro call below.
//
// Implementation details:
// - `define_build_meta!` expands into `pub const` string slices plus the
//   `Banner` value handed to `lumen_hwinfo`
// - `concat!` builds the derived strings at compile time
// - Build date is written by hand so builds stay reproducible

use lumen_hwinfo::Banner;

macro_rules! define_build_meta {
    ($kernel_name:literal, $banner_name:literal, $version:literal, $tagline:literal, $build_date:literal) => {
        #[allow(dead_code)]
        pub const KERNEL_NAME: &str = $kernel_name;
        pub const VERSION: &str = $version;
        pub const TAGLINE: &str = $tagline;
        #[allow(dead_code)]
        pub const BUILD_DATE: &str = $build_date;

        pub const VERSION_TAG: &str = concat!($kernel_name, " v", $version, " (", $build_date, ")");

        pub const BANNER: Banner<'static> = Banner {
            name: $banner_name,
            tagline: TAGLINE,
            version: VERSION,
        };
    };
}

define_build_meta!(
    "Lumen",
    "L U M E N",
    "0.1.0",
    "Hardware-aware minimal kernel",
    "2026-10-17"
);
