tonic::include_proto!("ipc");

/// File name of the introspection socket inside a job's tmp dir.
pub const SOCKET_NAME: &str = "handler_ipc.sock";
