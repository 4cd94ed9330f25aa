use protocol::{
    envelope::{Message, Response},
    frame::{recv_json, send_json},
    types::FileEntrySnapshot,
};
use tokio::net::TcpStream;
use utilities::{
    logger::{instrument, trace, tracing},
    result::Result,
};

/// Outbound link to the metaserver, used to report a finished write so the
/// namespace and capacity bookkeeping stay in step. One connection per
/// report, like every other envelope exchange.
pub struct MetaLink {
    addrs: String,
}

impl MetaLink {
    pub fn new(addrs: String) -> Self {
        Self { addrs }
    }

    #[instrument(name = "meta_link_report_entry", skip(self, snapshot), fields(name = %snapshot.name))]
    pub async fn report_entry(&self, snapshot: &FileEntrySnapshot) -> Result<()> {
        let mut stream = TcpStream::connect(&self.addrs).await?;
        let msg = Message::new("updateentry", vec![snapshot.name.clone()]);
        send_json(&mut stream, &msg).await?;
        send_json(&mut stream, snapshot).await?;
        let response: Response = recv_json(&mut stream).await?;
        trace!(?response, "metaserver acknowledged write report");
        response.into_result().map(|_| ())
    }
}
