use protobuf::{
    egress_handler_client::EgressHandlerClient, GstPipelineDebugDotRequest, MetricsRequest,
    PProfRequest,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::net::UnixStream;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;

pub type Error = Box<dyn std::error::Error>;

pub struct ClientCli {
    inner: EgressHandlerClient<Channel>,
}

impl ClientCli {
    pub async fn connect(socket: &Path) -> Result<Self, Error> {
        let socket = socket.to_path_buf();
        // the uri is ignored, every connection goes to the unix socket
        let channel = Endpoint::try_from("http://[::]:50051")?
            .connect_with_connector(service_fn(move |_: Uri| {
                UnixStream::connect(socket.clone())
            }))
            .await?;
        Ok(Self {
            inner: EgressHandlerClient::new(channel),
        })
    }

    pub async fn pipeline_dot(&mut self) -> Result<(), Error> {
        let response = self
            .inner
            .get_pipeline_dot(GstPipelineDebugDotRequest {})
            .await?;
        println!("{}", response.into_inner().dot_file);
        Ok(())
    }

    pub async fn pprof(
        &mut self,
        profile_name: String,
        timeout: i32,
        debug: i32,
        output: Option<PathBuf>,
    ) -> Result<(), Error> {
        let response = self
            .inner
            .get_p_prof(PProfRequest {
                profile_name,
                timeout,
                debug,
            })
            .await?;
        let data = response.into_inner().pprof_file;
        match output {
            Some(path) => {
                tokio::fs::write(&path, &data).await?;
                println!("Wrote {} bytes to {}", data.len(), path.display());
            }
            None => std::io::stdout().write_all(&data)?,
        }
        Ok(())
    }

    pub async fn metrics(&mut self) -> Result<(), Error> {
        let response = self.inner.get_metrics(MetricsRequest {}).await?;
        print!("{}", response.into_inner().metrics);
        Ok(())
    }
}
