use log::{debug, info};

use crate::codec;
use crate::cryptor::{self, CipherKind};
use crate::error::{Error, Result};
use crate::transport::Transport;
use crate::tree::Cabinet;

/// Fixed password length demanded by the legacy cipher's key size. Inherited
/// file-format constraint: accepted passwords are empty (no encryption) or
/// exactly this many characters.
pub const PASSWORD_LEN: usize = 8;

/// An opened vault file: the cabinet plus the transport, path, and password
/// needed to persist it. The `&mut self` receivers are the single-writer
/// discipline: no two open/save operations can overlap on one handle.
pub struct StoreHandle<T: Transport> {
    transport: T,
    path: String,
    password: String,
    cabinet: Cabinet,
}

impl<T: Transport> StoreHandle<T> {
    /// Open an existing vault file. Decryption tries the current cipher
    /// first, then the legacy cipher; a legacy success marks the cabinet
    /// dirty so the next save re-encrypts under the current cipher. After
    /// decoding, the document's declared password must match the supplied
    /// one.
    pub fn open(transport: T, path: &str, password: &str) -> Result<Self> {
        validate_password(password)?;
        let raw = transport.read(path)?;

        let (text, fell_back) = if password.is_empty() {
            (raw, false)
        } else {
            match cryptor::decrypt(&raw, password, CipherKind::Current) {
                Ok(text) => (text, false),
                Err(Error::Decryption(_)) => {
                    (cryptor::decrypt(&raw, password, CipherKind::Legacy)?, true)
                }
                Err(e) => return Err(e),
            }
        };

        let mut cabinet = codec::decode(&text)?;
        if cabinet.password() != password {
            return Err(Error::Authentication(format!(
                "declared password of '{path}' does not match the supplied one"
            )));
        }

        if fell_back {
            cabinet.set_cipher(CipherKind::Legacy);
            cabinet.mark_dirty();
            info!("event=store_open status=ok path={path} cipher=legacy migrate_on_save=true");
        } else {
            info!("event=store_open status=ok path={path} cipher=current");
        }

        Ok(Self {
            transport,
            path: path.to_string(),
            password: password.to_string(),
            cabinet,
        })
    }

    /// First write of a fresh cabinet at `path`, with the same read-back
    /// verification as [`StoreHandle::save`].
    pub fn create(transport: T, path: &str, cabinet: Cabinet) -> Result<Self> {
        validate_password(cabinet.password())?;
        let password = cabinet.password().to_string();
        let mut handle = Self {
            transport,
            path: path.to_string(),
            password,
            cabinet,
        };
        let path = handle.path.clone();
        let password = handle.password.clone();
        handle.write_verified(&path, &password)?;
        handle.cabinet.clear_dirty();
        handle.cabinet.set_cipher(CipherKind::Current);
        info!("event=store_create status=ok path={path}");
        Ok(handle)
    }

    pub fn cabinet(&self) -> &Cabinet {
        &self.cabinet
    }

    pub fn cabinet_mut(&mut self) -> &mut Cabinet {
        &mut self.cabinet
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Persist the cabinet if anything changed. Encodes, encrypts under the
    /// current cipher with the cabinet's password, writes a temporary copy,
    /// reads it back and structurally compares it against the in-memory tree,
    /// and only then replaces the real file. A clean tree performs no I/O.
    pub fn save(&mut self) -> Result<()> {
        if !self.cabinet.is_dirty() {
            debug!("event=store_save status=skipped path={} reason=clean", self.path);
            return Ok(());
        }
        validate_password(self.cabinet.password())?;
        let path = self.path.clone();
        let password = self.cabinet.password().to_string();
        self.write_verified(&path, &password)?;
        self.password = password;
        self.cabinet.clear_dirty();
        self.cabinet.set_cipher(CipherKind::Current);
        info!("event=store_save status=ok path={path}");
        Ok(())
    }

    /// Persist to a new location and/or password (the password-change path).
    /// The handle only repoints after the verified write succeeds, so a
    /// failure leaves the previous file authoritative.
    pub fn save_as(&mut self, path: &str, password: &str) -> Result<()> {
        validate_password(password)?;
        self.cabinet.set_password(password);
        self.write_verified(path, password)?;
        self.path = path.to_string();
        self.password = password.to_string();
        self.cabinet.clear_dirty();
        self.cabinet.set_cipher(CipherKind::Current);
        info!("event=store_save_as status=ok path={path}");
        Ok(())
    }

    fn write_verified(&mut self, path: &str, password: &str) -> Result<()> {
        let text = codec::encode(&self.cabinet)?;
        let payload = cryptor::encrypt(&text, password);

        let tmp = format!("{path}.tmp");
        if !self.transport.exists(&tmp) {
            self.transport.create(&tmp, "")?;
        }
        self.transport.write(&tmp, &payload)?;

        if let Err(err) = self.verify(&tmp, password) {
            let _ = self.transport.delete(&tmp);
            return Err(err);
        }

        if !self.transport.exists(path) {
            self.transport.create(path, "")?;
        }
        self.transport.write(path, &payload)?;
        let _ = self.transport.delete(&tmp);
        Ok(())
    }

    /// Read the temporary copy back and compare the decoded tree to the
    /// in-memory one. Any failure along the way counts as an integrity
    /// failure: the bytes on the other side are not a faithful vault.
    fn verify(&self, tmp: &str, password: &str) -> Result<()> {
        let raw = self.transport.read(tmp).map_err(integrity)?;
        let text = if password.is_empty() {
            raw
        } else {
            cryptor::decrypt(&raw, password, CipherKind::Current).map_err(integrity)?
        };
        let decoded = codec::decode(&text).map_err(integrity)?;
        if !decoded.structural_eq(&self.cabinet) {
            return Err(Error::Integrity(format!(
                "written copy of '{}' does not match the in-memory tree",
                self.path
            )));
        }
        Ok(())
    }
}

fn validate_password(password: &str) -> Result<()> {
    if password.is_empty() || password.chars().count() == PASSWORD_LEN {
        Ok(())
    } else {
        Err(Error::Authentication(format!(
            "password must be empty or exactly {PASSWORD_LEN} characters"
        )))
    }
}

fn integrity(e: Error) -> Error {
    Error::Integrity(format!("read-back verification failed: {e}"))
}
