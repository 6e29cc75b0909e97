use egresslib::{Error, Result};
use prometheus::{proto::MetricFamily, Encoder, TextEncoder};
use tracing::error;

/// Render metric families in the text exposition format, in the order given.
///
/// Returns the text along with the number of metrics rendered. A family that cannot be encoded
/// fails the whole render; nothing partial is returned.
pub fn render_metrics(families: &[MetricFamily]) -> Result<(String, usize)> {
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    let mut count = 0;
    for family in families {
        if let Err(err) = encoder.encode(std::slice::from_ref(family), &mut buf) {
            error!(family = family.get_name(), error = %err, "error writing metric family");
            return Err(Error::Metrics(err.to_string()));
        }
        count += family.get_metric().len();
    }
    let text = String::from_utf8(buf).map_err(|err| Error::Metrics(err.to_string()))?;
    Ok((text, count))
}
