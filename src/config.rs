use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::error::ValidatorError;

/// WOPI Validator — exercises a WOPI host endpoint against a test catalog.
#[derive(Parser, Debug, Clone)]
#[command(name = "wopi-validator")]
#[command(version, about)]
pub struct CliArgs {
    /// WOPI file endpoint URL to exercise (e.g. http://host/wopi/files/<id>)
    #[arg(short = 'w', long = "wopi-endpoint")]
    pub wopi_endpoint: Option<String>,

    /// Access token the target host expects for that file
    #[arg(short = 't', long = "access-token")]
    pub access_token: Option<String>,

    /// Access token TTL in seconds; also the per-request HTTP timeout
    #[arg(short = 'l', long = "token-ttl", default_value_t = DEFAULT_TOKEN_TTL_SECS)]
    pub token_ttl: u64,

    /// Run only the named test case
    #[arg(short = 'n', long = "test-name")]
    pub test_name: Option<String>,

    /// Test category filter
    #[arg(short = 'c', long = "test-category", default_value = "All")]
    pub test_category: CategoryFilter,

    /// Run only cases in the named test group (case-insensitive)
    #[arg(short = 'g', long = "test-group")]
    pub test_group: Option<String>,

    /// Path to the test catalog XML
    #[arg(short = 'r', long = "catalog", default_value = DEFAULT_CATALOG_FILE)]
    pub catalog: PathBuf,

    /// Exclude skipped cases from failure gating
    #[arg(long = "ignore-skipped")]
    pub ignore_skipped: bool,

    /// PKCS#8 PEM file with the current RSA proof key (generated when absent)
    #[arg(long = "proof-key-file")]
    pub proof_key_file: Option<PathBuf>,

    /// PKCS#8 PEM file with the old RSA proof key (generated when absent)
    #[arg(long = "old-proof-key-file")]
    pub old_proof_key_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print a <wopi-discovery> document carrying the proof-key public parameters
    ExportProofKeys,
}

/// Category selection on the command line. `All` admits every case; the two
/// client categories each include WopiCore.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
#[value(rename_all = "PascalCase")]
pub enum CategoryFilter {
    All,
    WopiCore,
    OfficeNativeClient,
    OfficeOnline,
}

pub struct ValidatorConfig {
    pub wopi_endpoint: String,
    pub access_token: String,
    pub token_ttl_secs: u64,
    pub test_name: Option<String>,
    pub test_category: CategoryFilter,
    pub test_group: Option<String>,
    pub catalog_path: PathBuf,
    pub ignore_skipped: bool,
    pub proof_key_file: Option<PathBuf>,
    pub old_proof_key_file: Option<PathBuf>,
}

pub const DEFAULT_CATALOG_FILE: &str = "TestCases.xml";
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;

pub const DEFAULT_USER_AGENT: &str = concat!("wopi-validator/", env!("CARGO_PKG_VERSION"));
pub const OFFICE_NATIVE_USER_AGENT: &str = "Microsoft Office Word 2014";

// Wire headers the executor synthesizes itself. Catalog-declared headers
// arrive as free-form strings and keep their declared casing.
pub const HDR_WOPI_TIMESTAMP: &str = "X-WOPI-TimeStamp";
pub const HDR_WOPI_PROOF: &str = "X-WOPI-Proof";
pub const HDR_WOPI_PROOF_OLD: &str = "X-WOPI-ProofOld";
pub const HDR_WOPI_LOCK: &str = "X-WOPI-Lock";
pub const HDR_WOPI_OVERRIDE: &str = "X-WOPI-Override";

// State keys every case starts with.
pub const STATE_WOPI_ENDPOINT: &str = "WopiEndpoint";
pub const STATE_ACCESS_TOKEN: &str = "AccessToken";
pub const STATE_ACCESS_TOKEN_TTL: &str = "AccessTokenTTL";
pub const STATE_FILE: &str = "File";
pub const STATE_FILE_EXTENSION: &str = "FileExtension";
pub const STATE_BASE_FILE_NAME: &str = "BaseFileName";

pub const ACCESS_TOKEN_QUERY_PARAM: &str = "access_token";

impl ValidatorConfig {
    pub fn from_args(args: CliArgs) -> Result<Self, ValidatorError> {
        let wopi_endpoint = args.wopi_endpoint.ok_or_else(|| {
            ValidatorError::Configuration("a WOPI endpoint is required (-w <url>)".to_string())
        })?;
        let access_token = args.access_token.ok_or_else(|| {
            ValidatorError::Configuration("an access token is required (-t <token>)".to_string())
        })?;

        Ok(ValidatorConfig {
            wopi_endpoint,
            access_token,
            token_ttl_secs: args.token_ttl,
            test_name: args.test_name,
            test_category: args.test_category,
            test_group: args.test_group,
            catalog_path: args.catalog,
            ignore_skipped: args.ignore_skipped,
            proof_key_file: args.proof_key_file,
            old_proof_key_file: args.old_proof_key_file,
        })
    }
}
