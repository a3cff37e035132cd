//! Outbound half of the duplex stream, server side: analyses and commands
//! produced by workflows fan out to every connected I/O-tier peer, and
//! SMS-kind commands are additionally delivered through the SMS gateway
//! under the token-bucket rate limit.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use fr0g_clients::sms::SmsSendRequest;
use fr0g_clients::{SmsClient, TokenBucket};
use fr0g_core::types::{CommandKind, OutputCommand, ThreatAnalysisResult};
use fr0g_orchestrator::workflow::OutboundDispatcher;
use fr0g_stream::Envelope;

pub struct StreamDispatcher {
    clients: Arc<DashMap<String, mpsc::Sender<String>>>,
    sms: Arc<SmsClient>,
    sms_bucket: Arc<TokenBucket>,
    sms_from: String,
    cancel: CancellationToken,
}

impl StreamDispatcher {
    pub fn new(
        clients: Arc<DashMap<String, mpsc::Sender<String>>>,
        sms: Arc<SmsClient>,
        sms_bucket: Arc<TokenBucket>,
        sms_from: String,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            clients,
            sms,
            sms_bucket,
            sms_from,
            cancel,
        }
    }

    fn broadcast(&self, frame: String) {
        for entry in self.clients.iter() {
            // try_send: a slow peer loses frames rather than stalling the
            // workflow; correlation ids let it recover via /status polling.
            if entry.value().try_send(frame.clone()).is_err() {
                warn!(conn_id = %entry.key(), "stream peer queue full, frame dropped");
            }
        }
    }

    /// Deliver one SMS command through the gateway, rate-limited and
    /// tracked. Runs detached so workflow completion is not held up.
    fn deliver_sms(&self, command: &OutputCommand) {
        let sms = self.sms.clone();
        let bucket = self.sms_bucket.clone();
        let cancel = self.cancel.clone();
        let request = SmsSendRequest {
            to: command.target.clone(),
            from: self.sms_from.clone(),
            message: command.content.clone(),
        };
        let command_id = command.id.clone();
        tokio::spawn(async move {
            if bucket.acquire(&cancel).await.is_err() {
                return;
            }
            match sms.send(&command_id, request, &cancel).await {
                Ok(response) => {
                    sms.tracker().watch(&command_id, &cancel);
                    debug!(command_id, message_id = %response.message_id, "sms command delivered");
                }
                Err(e) => warn!(command_id, error = %e, "sms command delivery failed"),
            }
        });
    }
}

#[async_trait]
impl OutboundDispatcher for StreamDispatcher {
    fn is_connected(&self) -> bool {
        !self.clients.is_empty()
    }

    async fn dispatch_analysis(&self, analysis: &ThreatAnalysisResult) {
        match Envelope::threat_analysis(analysis).and_then(|e| e.encode()) {
            Ok(frame) => {
                debug!(event_id = %analysis.event_id, "dispatching analysis to stream peers");
                self.broadcast(frame);
            }
            Err(e) => warn!(error = %e, "analysis envelope encoding failed"),
        }
    }

    async fn dispatch_command(&self, command: &OutputCommand) {
        match Envelope::output_command(command).and_then(|e| e.encode()) {
            Ok(frame) => self.broadcast(frame),
            Err(e) => warn!(error = %e, "command envelope encoding failed"),
        }
        if command.kind == CommandKind::Sms {
            self.deliver_sms(command);
        }
    }
}
