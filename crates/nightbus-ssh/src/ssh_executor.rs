use nightbus_core::config::{HostConfig, HostsConfig};
use nightbus_core::error::ExecutorError;
use nightbus_core::executor::{
    CommandOutput, CommandRequest, Completion, Executor, HostOutput, HostSender,
};
use ssh2::{Channel, ExtendedData, Session};
use std::io::{BufRead, BufReader};
use std::net::TcpStream;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// SSH executor: opens one session per host, runs the command through the
/// task's shell and streams the combined stdout/stderr back line by line.
pub struct SshExecutor {
    hosts: HostsConfig,
    default_shell: String,
}

impl SshExecutor {
    pub fn new(hosts: HostsConfig, default_shell: impl Into<String>) -> Self {
        Self {
            hosts,
            default_shell: default_shell.into(),
        }
    }
}

#[async_trait::async_trait]
impl Executor for SshExecutor {
    fn executor_type(&self) -> &str {
        "ssh"
    }

    async fn run_command(&self, request: CommandRequest) -> Result<CommandOutput, ExecutorError> {
        let shell = request.shell.as_deref().unwrap_or(&self.default_shell);
        let remote_cmd = shell_command(shell, &request.command);

        // Connect and start the command everywhere before returning any output,
        // giving up as soon as one host fails.
        let mut pending = JoinSet::new();
        for host in &request.hosts {
            let config = self
                .hosts
                .get(host)
                .cloned()
                .ok_or_else(|| ExecutorError::UnknownHost(host.clone()))?;
            let host = host.clone();
            let remote_cmd = remote_cmd.clone();
            pending.spawn_blocking(move || {
                let session = connect(&host, &config)?;
                let channel = start_command(&session, &host, &remote_cmd)?;
                Ok::<_, ExecutorError>((host, session, channel))
            });
        }

        let mut started = Vec::with_capacity(request.hosts.len());
        while let Some(joined) = pending.join_next().await {
            let outcome = joined
                .map_err(|e| ExecutorError::Driver(e.to_string()))
                .and_then(|result| result);
            match outcome {
                Ok(host_session) => started.push(host_session),
                Err(e) => {
                    warn!("Submission failed, abandoning command: {}", e);
                    pending.abort_all();
                    return Err(e);
                }
            }
        }
        info!("Command started on {} host(s)", started.len());

        let mut hosts = Vec::with_capacity(started.len());
        let mut drivers = Vec::with_capacity(started.len());
        for (host, session, channel) in started {
            let (output, sender) = HostOutput::channel(host.clone());
            hosts.push(output);
            drivers.push(tokio::task::spawn_blocking(move || {
                drain(host, session, channel, sender)
            }));
        }

        Ok(CommandOutput {
            hosts,
            completion: Completion::new(drivers),
        })
    }
}

/// Remote command line that runs `command` under `shell`, e.g. `sh -c '<command>'`.
pub fn shell_command(shell: &str, command: &str) -> String {
    format!("{} {}", shell, shell_escape(command))
}

/// Establish an authenticated SSH session to a host.
fn connect(host_id: &str, config: &HostConfig) -> Result<Session, ExecutorError> {
    let conn_err = |message: String| ExecutorError::SshConnection {
        host: host_id.to_string(),
        message,
    };

    let address = config.address(host_id);
    let port = config.ssh_port();
    let user = config
        .user
        .clone()
        .or_else(|| std::env::var("USER").ok())
        .ok_or_else(|| conn_err("no user configured and $USER is unset".into()))?;

    debug!("Connecting to {}@{}:{}", user, address, port);
    let tcp = TcpStream::connect((address, port))
        .map_err(|e| conn_err(format!("TCP connect to {}:{}: {}", address, port, e)))?;

    let mut sess = Session::new().map_err(|e| conn_err(format!("Session::new: {}", e)))?;
    sess.set_tcp_stream(tcp);
    sess.handshake()
        .map_err(|e| conn_err(format!("Handshake: {}", e)))?;

    if let Some(key_path) = &config.private_key {
        sess.userauth_pubkey_file(&user, None, key_path, None)
            .map_err(|e| conn_err(format!("Pubkey auth: {}", e)))?;
    } else if let Some(password) = &config.password {
        sess.userauth_password(&user, password)
            .map_err(|e| conn_err(format!("Password auth: {}", e)))?;
    } else {
        sess.userauth_agent(&user)
            .map_err(|e| conn_err(format!("Agent auth: {}", e)))?;
    }

    if !sess.authenticated() {
        return Err(conn_err("Authentication failed".into()));
    }

    info!("SSH connected to {}@{}:{}", user, address, port);
    Ok(sess)
}

fn start_command(sess: &Session, host: &str, cmd: &str) -> Result<Channel, ExecutorError> {
    let cmd_err = |message: String| ExecutorError::SshCommand {
        host: host.to_string(),
        message,
    };
    let mut channel = sess
        .channel_session()
        .map_err(|e| cmd_err(format!("Channel: {}", e)))?;
    channel
        .handle_extended_data(ExtendedData::Merge)
        .map_err(|e| cmd_err(format!("Merge stderr: {}", e)))?;
    channel
        .exec(cmd)
        .map_err(|e| cmd_err(format!("Exec: {}", e)))?;
    Ok(channel)
}

/// Forward a host's output to its watcher until the channel reaches EOF,
/// then publish the exit status. Runs on a blocking thread.
fn drain(
    host: String,
    _session: Session,
    mut channel: Channel,
    sender: HostSender,
) -> Result<(), ExecutorError> {
    let mut reader = BufReader::new(&mut channel);
    let mut buf = Vec::new();
    let mut watching = true;
    let read_result = loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break Ok(()),
            Ok(_) => {
                // Once the watcher is gone, keep draining so the remote side can finish.
                if watching {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(|c: char| c == '\n' || c == '\r');
                    watching = sender.blocking_send_line(line.to_string());
                }
            }
            Err(e) => break Err(e),
        }
    };
    drop(reader);

    let closed = channel.wait_close();
    let exit_code = match &closed {
        Ok(()) => channel.exit_status().ok(),
        Err(_) => None,
    };
    debug!("{}: remote command exited with {:?}", host, exit_code);
    sender.finish(exit_code);

    read_result.map_err(|e| ExecutorError::SshCommand {
        host: host.clone(),
        message: format!("Read output: {}", e),
    })?;
    closed.map_err(|e| ExecutorError::SshCommand {
        host,
        message: format!("Close channel: {}", e),
    })
}

/// Shell-escape a string for safe use in remote commands.
fn shell_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}
