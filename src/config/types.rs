//! Shared constants for TypeScript binding generation.

/// Output path for generated TypeScript types, relative to the crate root.
pub const TS_EXPORT_PATH: &str = "../dashboard/src/api/types.generated.ts";
