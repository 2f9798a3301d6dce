//! Domain models for the symbol registry
//!
//! Projects are owned by the host; this registry only keeps their catalog
//! integration settings, the applications seen in each catalog, and the
//! debug-symbol bundles downloaded for each build.

use bridge_traits::catalog::{CatalogApplication, CatalogBuild, CatalogCredentials};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

// =============================================================================
// ID Types
// =============================================================================

/// Identifier of a host project. Opaque to this crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProjectId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
                Ok(Self(Uuid::parse_str(s)?))
            }

            pub fn as_string(&self) -> String {
                self.0.to_string()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Surrogate key of an [`Application`]
    ApplicationId
);
uuid_id!(
    /// Surrogate key of a [`DebugSymbolBundle`]
    BundleId
);
uuid_id!(
    /// Identifier of a stored symbol file; also its file name on disk
    SymbolFileId
);

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

// =============================================================================
// Integration Settings
// =============================================================================

/// Catalog integration settings of one project.
#[derive(Clone, PartialEq, Eq)]
pub struct IntegrationSettings {
    pub project_id: ProjectId,
    pub enabled: bool,
    pub api_base_url: String,
    pub api_token: String,
    pub team_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl IntegrationSettings {
    /// Enabled settings with the given endpoint and token.
    pub fn new(
        project_id: ProjectId,
        api_base_url: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Self {
        let now = now();
        Self {
            project_id,
            enabled: true,
            api_base_url: api_base_url.into(),
            api_token: api_token.into(),
            team_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_team_id(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Both the endpoint and the token are present.
    pub fn is_configured(&self) -> bool {
        !self.api_base_url.trim().is_empty() && !self.api_token.trim().is_empty()
    }

    /// Credentials for building a catalog client, if the integration is usable.
    pub fn credentials(&self) -> Option<CatalogCredentials> {
        if !self.enabled || !self.is_configured() {
            return None;
        }

        let credentials = CatalogCredentials::new(&self.api_base_url, &self.api_token);
        Some(match &self.team_id {
            Some(team_id) => credentials.with_team_id(team_id),
            None => credentials,
        })
    }
}

impl fmt::Debug for IntegrationSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegrationSettings")
            .field("project_id", &self.project_id)
            .field("enabled", &self.enabled)
            .field("api_base_url", &self.api_base_url)
            .field("api_token", &"[REDACTED]")
            .field("team_id", &self.team_id)
            .finish()
    }
}

// =============================================================================
// Application
// =============================================================================

/// An application of a project, as last seen in its catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub project_id: ProjectId,
    /// Catalog-side identifier; unique within the project
    pub remote_app_id: String,
    pub name: String,
    pub bundle_id: String,
    pub platform: Option<String>,
    pub icon_url: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Application {
    pub fn new(
        project_id: ProjectId,
        remote_app_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let now = now();
        Self {
            id: ApplicationId::new(),
            project_id,
            remote_app_id: remote_app_id.into(),
            name: name.into(),
            bundle_id: String::new(),
            platform: None,
            icon_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Build a record from a catalog listing.
    pub fn from_catalog(project_id: ProjectId, app: &CatalogApplication) -> Self {
        let mut application = Self::new(project_id, &app.id, &app.name);
        application.bundle_id = app.bundle_id.clone().unwrap_or_default();
        application.platform = app.platform.clone();
        application.icon_url = app.icon_url.clone();
        application
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.remote_app_id.trim().is_empty() {
            return Err("Application remote_app_id cannot be empty".to_string());
        }
        if self.name.trim().is_empty() {
            return Err("Application name cannot be empty".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Stored files & bundles
// =============================================================================

/// A symbol file copied into project-scoped storage by the unpacker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSymbolFile {
    pub id: SymbolFileId,
    pub project_id: ProjectId,
    /// Entry path inside the source archive
    pub name: String,
    /// Lowercase hex SHA-256 of the contents
    pub sha256: String,
    pub size: u64,
    /// Location in symbol storage
    pub path: PathBuf,
}

/// The registered debug symbols of one build of one application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugSymbolBundle {
    pub id: BundleId,
    pub application_id: ApplicationId,
    pub build_id: String,
    pub version: String,
    pub platform: String,
    pub file_count: u32,
    pub created_at: i64,
}

impl DebugSymbolBundle {
    pub fn new(application_id: ApplicationId, build: &CatalogBuild) -> Self {
        Self {
            id: BundleId::new(),
            application_id,
            build_id: build.build_id.clone(),
            version: build.version.clone(),
            platform: build.platform.clone(),
            file_count: 0,
            created_at: now(),
        }
    }
}

/// A stored file as recorded under its bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleFile {
    pub file_id: SymbolFileId,
    pub bundle_id: BundleId,
    pub project_id: ProjectId,
    pub name: String,
    pub sha256: String,
    pub size: u64,
    pub path: PathBuf,
    pub created_at: i64,
}

impl BundleFile {
    pub fn from_stored(bundle_id: BundleId, file: &StoredSymbolFile) -> Self {
        Self {
            file_id: file.id,
            bundle_id,
            project_id: file.project_id.clone(),
            name: file.name.clone(),
            sha256: file.sha256.clone(),
            size: file.size,
            path: file.path.clone(),
            created_at: now(),
        }
    }
}
