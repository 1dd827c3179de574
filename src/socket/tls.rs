use crate::base::neterror::NetError;
use boring::pkey::PKey;
use boring::ssl::{ConnectConfiguration, SslConnector, SslMethod, SslVerifyMode, SslVersion};
use std::path::PathBuf;

/// Certificate verification and client certificate settings for HTTPS.
#[derive(Debug, Clone)]
pub struct TlsOptions {
    /// Verify the server certificate chain.
    pub verify_peer: bool,
    /// Verify that the certificate matches the host name.
    pub verify_host: bool,
    /// PEM bundle of trusted CA certificates.
    pub cafile: Option<PathBuf>,
    /// Directory of PEM CA certificates.
    pub capath: Option<PathBuf>,
    /// PEM file holding the client certificate chain and its private key.
    pub local_cert: Option<PathBuf>,
    /// Passphrase for an encrypted `local_cert` key.
    pub passphrase: Option<String>,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            verify_peer: true,
            verify_host: true,
            cafile: None,
            capath: None,
            local_cert: None,
            passphrase: None,
        }
    }
}

impl TlsOptions {
    /// Build a connector with these settings.
    pub fn connector(&self) -> Result<SslConnector, NetError> {
        let mut builder =
            SslConnector::builder(SslMethod::tls()).map_err(|_| NetError::SslProtocolError)?;

        builder
            .set_min_proto_version(Some(SslVersion::TLS1_2))
            .map_err(|_| NetError::SslProtocolError)?;
        builder
            .set_alpn_protos(b"\x08http/1.1")
            .map_err(|_| NetError::SslProtocolError)?;

        if self.verify_peer {
            builder.set_verify(SslVerifyMode::PEER);
        } else {
            builder.set_verify(SslVerifyMode::NONE);
        }

        if let Some(cafile) = &self.cafile {
            builder.set_ca_file(cafile).map_err(|e| {
                NetError::Misconfiguration(format!("ssl_cafile {}: {}", cafile.display(), e))
            })?;
        }

        if let Some(capath) = &self.capath {
            let entries = std::fs::read_dir(capath).map_err(|e| {
                NetError::Misconfiguration(format!("ssl_capath {}: {}", capath.display(), e))
            })?;
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                if let Err(e) = builder.set_ca_file(&path) {
                    tracing::warn!(path = %path.display(), error = %e, "skipping CA file");
                }
            }
        }

        if let Some(cert) = &self.local_cert {
            let misconfigured = |e: &dyn std::fmt::Display| {
                NetError::Misconfiguration(format!("ssl_local_cert {}: {}", cert.display(), e))
            };
            builder
                .set_certificate_chain_file(cert)
                .map_err(|e| misconfigured(&e))?;
            let pem = std::fs::read(cert).map_err(|e| misconfigured(&e))?;
            let key = match &self.passphrase {
                Some(pass) => PKey::private_key_from_pem_passphrase(&pem, pass.as_bytes()),
                None => PKey::private_key_from_pem(&pem),
            }
            .map_err(|e| misconfigured(&e))?;
            builder.set_private_key(&key).map_err(|e| misconfigured(&e))?;
        }

        Ok(builder.build())
    }

    /// Per-connection configuration for `host`.
    pub fn configure(
        &self,
        connector: &SslConnector,
        host: &str,
    ) -> Result<ConnectConfiguration, NetError> {
        let mut config = connector
            .configure()
            .map_err(|_| NetError::SslProtocolError)?;
        config.set_verify_hostname(self.verify_peer && self.verify_host);
        config.set_use_server_name_indication(should_set_sni(host));
        Ok(config)
    }
}

/// Per RFC 6066, SNI MUST NOT be set for raw IP addresses.
pub fn should_set_sni(host: &str) -> bool {
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<std::net::IpAddr>()
        .is_err()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sni_only_for_names() {
        assert!(should_set_sni("example.com"));
        assert!(!should_set_sni("127.0.0.1"));
        assert!(!should_set_sni("[::1]"));
    }

    #[test]
    fn test_defaults_verify() {
        let opts = TlsOptions::default();
        assert!(opts.verify_peer);
        assert!(opts.verify_host);
        assert!(opts.connector().is_ok());
    }

    #[test]
    fn test_missing_cafile_is_misconfiguration() {
        let opts = TlsOptions {
            cafile: Some(PathBuf::from("/nonexistent/ca.pem")),
            ..TlsOptions::default()
        };
        assert!(matches!(
            opts.connector(),
            Err(NetError::Misconfiguration(_))
        ));
    }
}
