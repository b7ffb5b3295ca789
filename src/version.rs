// Version information for the Fabstir embedding server

/// Full version string with feature description
pub const VERSION: &str = "v1.0.0-embedding-service-2025-10-20";

/// Semantic version number
pub const VERSION_NUMBER: &str = "1.0.0";

/// Build date
pub const BUILD_DATE: &str = "2025-10-20";
