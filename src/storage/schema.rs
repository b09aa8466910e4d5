// Key naming conventions and prefix constants
pub mod keys {
    /// Produced block key prefix: "{chain}:produced_block"
    pub const PRODUCED_BLOCK_PREFIX: &str = "produced_block";

    // example: filecoin:produced_block
    pub fn produced_block_key(chain: &str) -> String {
        format!("{}:{}", chain, PRODUCED_BLOCK_PREFIX)
    }

    /// Store-wide schema version marker
    pub const SCHEMA_VERSION_KEY: &str = "meta:schema_version";
}

// Data version management
pub const SCHEMA_VERSION: u32 = 1;
