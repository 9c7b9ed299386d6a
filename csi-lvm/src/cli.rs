use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use libcsi::backend::lvm::{DEFAULT_DRIVER_NAME, DEFAULT_LVMD_PORT, DEFAULT_VOLUME_GROUP};

#[derive(Parser, Debug)]
#[command(name = "csi-lvm", version)]
#[command(about = "CSI plugin provisioning LVM logical volumes through per-node lvmd daemons")]
pub struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the plugin server on this node
    Serve(ServeArgs),
    /// Ask a running plugin whether it is healthy
    Probe(ClientArgs),
    /// Delete a volume through a running plugin
    DeleteVolume {
        #[command(flatten)]
        client: ClientArgs,
        /// Volume id to delete
        volume_id: String,
    },
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// QUIC listen address
    #[arg(long, env = "CSI_ENDPOINT", default_value = "0.0.0.0:7443")]
    pub endpoint: SocketAddr,

    /// Name of this node, as in its node record
    #[arg(long, env = "NODE_ID")]
    pub node_id: String,

    #[arg(long, env = "CSI_DRIVER_NAME", default_value = DEFAULT_DRIVER_NAME)]
    pub driver_name: String,

    /// Volume group logical volumes are created in
    #[arg(long, env = "LVM_VOLUME_GROUP", default_value = DEFAULT_VOLUME_GROUP)]
    pub vg_name: String,

    /// Port lvmd listens on, on every node
    #[arg(long, env = "LVMD_PORT", default_value_t = DEFAULT_LVMD_PORT)]
    pub lvmd_port: u16,

    /// Seconds to keep retrying a dial to lvmd
    #[arg(long, env = "LVMD_CONNECT_TIMEOUT", default_value_t = 3)]
    pub connect_timeout: u64,

    /// API server URL; the in-cluster service account is used when unset
    #[arg(long, env = "KUBE_API_SERVER")]
    pub api_server: Option<String>,

    /// Bearer token file for the API server
    #[arg(long, env = "KUBE_TOKEN_FILE", requires = "api_server")]
    pub api_token_file: Option<PathBuf>,

    /// CA bundle for the API server
    #[arg(long, env = "KUBE_CA_FILE", requires = "api_server")]
    pub api_ca_file: Option<PathBuf>,

    #[arg(long, env = "KUBE_INSECURE_SKIP_TLS_VERIFY", default_value_t = false)]
    pub api_insecure: bool,

    /// Server certificate chain (PEM)
    #[arg(long, env = "CSI_TLS_CERT")]
    pub tls_cert: PathBuf,

    /// Server private key (PEM)
    #[arg(long, env = "CSI_TLS_KEY")]
    pub tls_key: PathBuf,
}

#[derive(Args, Debug)]
pub struct ClientArgs {
    /// Address of the plugin server
    #[arg(long, env = "CSI_SERVER", default_value = "127.0.0.1:7443")]
    pub server: SocketAddr,

    /// Name the server certificate is issued for
    #[arg(long, env = "CSI_SERVER_NAME", default_value = "localhost")]
    pub server_name: String,

    /// CA certificate the server certificate chains to (PEM)
    #[arg(long, env = "CSI_CA_CERT")]
    pub ca_cert: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_defaults() {
        let cli = Cli::parse_from([
            "csi-lvm",
            "serve",
            "--node-id",
            "node-1",
            "--tls-cert",
            "/etc/csi/tls.crt",
            "--tls-key",
            "/etc/csi/tls.key",
        ]);
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.node_id, "node-1");
        assert_eq!(args.vg_name, "lvmvg");
        assert_eq!(args.lvmd_port, 1736);
        assert_eq!(args.connect_timeout, 3);
        assert!(args.api_server.is_none());
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn delete_volume_takes_id() {
        let cli = Cli::parse_from([
            "csi-lvm",
            "--log-format",
            "json",
            "delete-volume",
            "--ca-cert",
            "/etc/csi/ca.crt",
            "vol-1",
        ]);
        let Command::DeleteVolume { client, volume_id } = cli.command else {
            panic!("expected delete-volume");
        };
        assert_eq!(volume_id, "vol-1");
        assert_eq!(client.server_name, "localhost");
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn token_file_requires_api_server() {
        let res = Cli::try_parse_from([
            "csi-lvm",
            "serve",
            "--node-id",
            "n",
            "--tls-cert",
            "c",
            "--tls-key",
            "k",
            "--api-token-file",
            "/t",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn client_does_not_follow_listen_address() {
        // SAFETY: no other test asserts on a value read from CSI_ENDPOINT.
        unsafe { std::env::set_var("CSI_ENDPOINT", "0.0.0.0:9443") };
        let cli = Cli::parse_from(["csi-lvm", "probe", "--ca-cert", "/etc/csi/ca.crt"]);
        let Command::Probe(client) = cli.command else {
            panic!("expected probe");
        };
        assert_eq!(client.server, "127.0.0.1:7443".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn every_serve_flag_has_env_fallback() {
        use clap::CommandFactory;

        let cmd = Cli::command();
        let serve = cmd.find_subcommand("serve").unwrap();
        for arg in serve.get_arguments() {
            if matches!(arg.get_id().as_str(), "help" | "version" | "log_format" | "log_level") {
                continue;
            }
            assert!(arg.get_env().is_some(), "--{} has no env", arg.get_id());
        }
    }
}
