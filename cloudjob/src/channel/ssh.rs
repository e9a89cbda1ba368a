use super::{decode_output, Connector, ExecOutput, RemoteSession};
use crate::error::{Error, Result};
use crate::gateway::SshConnectionConfig;
use ssh2::{ErrorCode, Session, Sftp};
use std::fmt::Display;
use std::fs::File;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

/// libssh2 reports a missing file with this SFTP status.
const SFTP_NO_SUCH_FILE: i32 = 2;
const REMOTE_DIR_MODE: i32 = 0o700;

fn connectivity(context: &str, err: impl Display) -> Error {
    Error::Connectivity(format!("{}: {}", context, err))
}

/// Key based SSH with SFTP file transfer.
///
/// Host keys are not verified: whatever key the instance presents is trusted. Freshly
/// provisioned instances have no known key to compare against.
#[derive(Clone, Debug)]
pub struct SshConnector {
    pub connect_timeout: Duration,
}

impl Default for SshConnector {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl Connector for SshConnector {
    fn connect(&self, config: &SshConnectionConfig) -> Result<Box<dyn RemoteSession>> {
        let addr = (config.host.as_str(), config.port)
            .to_socket_addrs()
            .map_err(|err| connectivity("resolve host", err))?
            .next()
            .ok_or_else(|| Error::Connectivity(format!("no address for {}", config.host)))?;
        let tcp = TcpStream::connect_timeout(&addr, self.connect_timeout)
            .map_err(|err| connectivity("connect", err))?;

        let mut session = Session::new().map_err(|err| connectivity("create session", err))?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|err| connectivity("handshake", err))?;
        if let Some((key, _)) = session.host_key() {
            tracing::warn!(
                host = %config.host,
                key_bytes = key.len(),
                "trusting unverified host key"
            );
        }
        session
            .userauth_pubkey_file(&config.username, None, &config.key_file, None)
            .map_err(|err| connectivity("authenticate", err))?;
        if !session.authenticated() {
            return Err(Error::Connectivity(format!(
                "{}@{} rejected key {}",
                config.username,
                config.host,
                config.key_file.display()
            )));
        }
        let sftp = session.sftp().map_err(|err| connectivity("open sftp", err))?;

        Ok(Box::new(SshSession {
            session,
            sftp: Some(sftp),
        }))
    }
}

struct SshSession {
    session: Session,
    sftp: Option<Sftp>,
}

impl SshSession {
    fn sftp(&self) -> Result<&Sftp> {
        self.sftp
            .as_ref()
            .ok_or_else(|| Error::Connectivity("session already closed".to_string()))
    }
}

impl RemoteSession for SshSession {
    fn create_dir(&mut self, path: &str) -> Result<()> {
        self.sftp()?
            .mkdir(Path::new(path), REMOTE_DIR_MODE)
            .map_err(|err| connectivity("create remote directory", err))
    }

    fn upload(&mut self, local: &Path, remote: &str) -> Result<()> {
        let mut source = File::open(local)?;
        let mut target = self
            .sftp()?
            .create(Path::new(remote))
            .map_err(|err| connectivity("create remote file", err))?;
        io::copy(&mut source, &mut target)?;
        Ok(())
    }

    fn write_file(&mut self, remote: &str, contents: &[u8]) -> Result<()> {
        let mut target = self
            .sftp()?
            .create(Path::new(remote))
            .map_err(|err| connectivity("create remote file", err))?;
        target.write_all(contents)?;
        Ok(())
    }

    fn read_file(&mut self, remote: &str) -> Result<Option<Vec<u8>>> {
        match self.sftp()?.open(Path::new(remote)) {
            Ok(mut file) => {
                let mut contents = Vec::new();
                file.read_to_end(&mut contents)?;
                Ok(Some(contents))
            }
            Err(err) if matches!(err.code(), ErrorCode::SFTP(SFTP_NO_SUCH_FILE)) => Ok(None),
            Err(err) => Err(connectivity("open remote file", err)),
        }
    }

    fn exec(&mut self, command: &str) -> Result<ExecOutput> {
        let mut channel = self
            .session
            .channel_session()
            .map_err(|err| connectivity("open channel", err))?;
        channel
            .exec(command)
            .map_err(|err| connectivity("exec", err))?;

        let mut stdout = Vec::new();
        channel.read_to_end(&mut stdout)?;
        let mut stderr = Vec::new();
        channel.stderr().read_to_end(&mut stderr)?;
        channel
            .wait_close()
            .map_err(|err| connectivity("close channel", err))?;
        let exit_status = channel
            .exit_status()
            .map_err(|err| connectivity("read exit status", err))?;

        Ok(ExecOutput {
            exit_status,
            stdout: decode_output(&stdout),
            stderr: decode_output(&stderr),
        })
    }

    fn close(&mut self) {
        // sftp borrows the session's transport, shut it down first
        self.sftp.take();
        if let Err(err) = self.session.disconnect(None, "cloudjob done", None) {
            tracing::debug!(error = %err, "ssh disconnect failed");
        }
    }
}
