use std::{fs::OpenOptions, io::Write, path::Path};

use stagelink::crypto::{KeyPair, PublicKey, SecretKey};
use tracing::debug;

use crate::error::Error;

/// The key pair participants seal their lock events to. A new one is
/// generated every time the server starts.
#[derive(Debug)]
pub struct ServerIdentity {
    keys: KeyPair,
}

impl ServerIdentity {
    pub fn generate() -> Self {
        Self {
            keys: KeyPair::generate(),
        }
    }

    /// Generates a fresh identity and writes its secret half to `path`,
    /// replacing whatever was there.
    pub fn generate_and_persist(path: &Path) -> Result<Self, Error> {
        let identity = Self::generate();
        identity
            .persist(path)
            .map_err(Error::IdentityGenerationFailed)?;

        debug!(
            public_key = %identity.public_key(),
            path = %path.display(),
            "Server identity ready"
        );

        Ok(identity)
    }

    fn persist(&self, path: &Path) -> std::io::Result<()> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(path)?;

        // `mode` only applies to files we create
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }

        file.write_all(self.keys.secret().to_file_contents().as_bytes())?;
        file.sync_all()
    }

    pub fn public_key(&self) -> &PublicKey {
        self.keys.public()
    }

    pub fn secret(&self) -> &SecretKey {
        self.keys.secret()
    }
}
