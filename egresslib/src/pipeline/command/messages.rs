#[derive(Debug)]
pub enum PipelineMessage {
    SendEos,
}
