//! JSON-lines bridge between the phone core and whatever drives it.
//!
//! Each input line is one [`BridgeInput`]: a platform telecom event or a UI
//! action. Everything the core wants to say (state changes, reminder status,
//! replies, requests for the telecom layer) goes out as one [`BridgeOutput`]
//! per line.
//!
//! ```text
//! {"platform":{"event":"newIncoming","handle":"c1","number":"07700900123"}}
//! {"control":"answer"}
//! {"acknowledge":{"id":3}}
//! "acknowledgeAll"
//! ```

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt},
    sync::{broadcast, mpsc},
    task::JoinHandle,
};

use crate::{
    call::{CallEvent, CallHandle, CallSession, ControlAction, PlatformEvent},
    db::{Database, NewContact},
    nag::{NagCycle, NagStatus},
    ports::Telecom,
    Phone,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

pub type Outbox = mpsc::UnboundedSender<BridgeOutput>;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BridgeInput {
    Platform(PlatformEvent),
    Control(ControlAction),
    PlaceCall { number: String },
    Acknowledge { id: i64 },
    AcknowledgeAll,
    AddContact(NewContact),
    Status,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BridgeOutput {
    Call {
        event: CallEvent,
    },
    Nag {
        status: NagStatus,
    },
    Telecom {
        request: TelecomRequest,
    },
    Status {
        call: Option<CallSession>,
        nag: NagCycle,
    },
    Reply {
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

impl BridgeOutput {
    fn ok() -> Self {
        BridgeOutput::Reply {
            ok: true,
            detail: None,
        }
    }

    fn ok_with(detail: String) -> Self {
        BridgeOutput::Reply {
            ok: true,
            detail: Some(detail),
        }
    }

    fn failed(detail: impl ToString) -> Self {
        BridgeOutput::Reply {
            ok: false,
            detail: Some(detail.to_string()),
        }
    }
}

/// Primitive the telecom layer on the other end of the bridge should carry out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum TelecomRequest {
    Answer { handle: CallHandle },
    Reject { handle: CallHandle, silent: bool },
    Disconnect { handle: CallHandle },
    Hold { handle: CallHandle },
    Unhold { handle: CallHandle },
    SetMuted { handle: CallHandle, muted: bool },
    SetSpeaker { handle: CallHandle, on: bool },
    PlaceCall { number: String },
}

/// [`Telecom`] that forwards every primitive over the bridge.
pub struct BridgeTelecom {
    outbox: Outbox,
}

impl BridgeTelecom {
    pub fn new(outbox: Outbox) -> Self {
        Self { outbox }
    }

    fn send(&self, request: TelecomRequest) -> Result<()> {
        log_info!("telecom <- {request:?}");
        self.outbox
            .send(BridgeOutput::Telecom { request })
            .map_err(|_| anyhow!("bridge output is closed"))
    }
}

impl Telecom for BridgeTelecom {
    fn answer(&self, handle: &CallHandle) -> Result<()> {
        self.send(TelecomRequest::Answer {
            handle: handle.clone(),
        })
    }

    fn reject(&self, handle: &CallHandle, silent: bool) -> Result<()> {
        self.send(TelecomRequest::Reject {
            handle: handle.clone(),
            silent,
        })
    }

    fn disconnect(&self, handle: &CallHandle) -> Result<()> {
        self.send(TelecomRequest::Disconnect {
            handle: handle.clone(),
        })
    }

    fn hold(&self, handle: &CallHandle) -> Result<()> {
        self.send(TelecomRequest::Hold {
            handle: handle.clone(),
        })
    }

    fn unhold(&self, handle: &CallHandle) -> Result<()> {
        self.send(TelecomRequest::Unhold {
            handle: handle.clone(),
        })
    }

    fn set_muted(&self, handle: &CallHandle, muted: bool) -> Result<()> {
        self.send(TelecomRequest::SetMuted {
            handle: handle.clone(),
            muted,
        })
    }

    fn set_speaker(&self, handle: &CallHandle, on: bool) -> Result<()> {
        self.send(TelecomRequest::SetSpeaker {
            handle: handle.clone(),
            on,
        })
    }

    fn place_call(&self, number: &str) -> Result<()> {
        self.send(TelecomRequest::PlaceCall {
            number: number.to_string(),
        })
    }
}

/// Drives a [`Phone`] from JSON lines. `contacts` is where `addContact` lines
/// are stored; without it they are refused.
pub struct Bridge {
    phone: Phone,
    contacts: Option<Database>,
}

impl Bridge {
    pub fn new(phone: Phone, contacts: Option<Database>) -> Self {
        Self { phone, contacts }
    }

    /// Applies one input line. Platform events are fire-and-forget and get no reply.
    pub async fn dispatch(&self, input: BridgeInput) -> Option<BridgeOutput> {
        let phone = &self.phone;
        let reply = match input {
            BridgeInput::Platform(event) => {
                phone.on_platform_event(event);
                return None;
            }
            BridgeInput::Control(action) => match phone.calls().control(action).await {
                Ok(()) => BridgeOutput::ok(),
                Err(err) => BridgeOutput::failed(err),
            },
            BridgeInput::PlaceCall { number } => match phone.place_call(&number).await {
                Ok(()) => BridgeOutput::ok(),
                Err(err) => BridgeOutput::failed(err),
            },
            BridgeInput::Acknowledge { id } => match phone.acknowledge_missed_call(id).await {
                Ok(true) => BridgeOutput::ok(),
                Ok(false) => BridgeOutput::ok_with(format!("call {id} was already read")),
                Err(err) => BridgeOutput::failed(format!("{err:#}")),
            },
            BridgeInput::AcknowledgeAll => match phone.acknowledge_all_missed_calls().await {
                Ok(count) => BridgeOutput::ok_with(format!("{count} missed calls acknowledged")),
                Err(err) => BridgeOutput::failed(format!("{err:#}")),
            },
            BridgeInput::AddContact(contact) => match &self.contacts {
                Some(db) => match db.insert_contact(&contact).await {
                    Ok(id) => BridgeOutput::ok_with(format!("contact {id} added")),
                    Err(err) => BridgeOutput::failed(format!("{err:#}")),
                },
                None => BridgeOutput::failed("no contact store attached"),
            },
            BridgeInput::Status => BridgeOutput::Status {
                call: phone.calls().snapshot().await,
                nag: phone.nag().cycle().await,
            },
        };
        Some(reply)
    }

    /// Reads input lines until EOF while a writer task drains the outbox.
    pub async fn serve<R, W>(
        self,
        input: R,
        mut output: W,
        outbox: Outbox,
        mut outbox_rx: mpsc::UnboundedReceiver<BridgeOutput>,
    ) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let writer = tokio::spawn(async move {
            while let Some(message) = outbox_rx.recv().await {
                let mut line = match serde_json::to_string(&message) {
                    Ok(line) => line,
                    Err(err) => {
                        log_warn!("could not encode {message:?}: {err}");
                        continue;
                    }
                };
                line.push('\n');
                output.write_all(line.as_bytes()).await?;
                output.flush().await?;
            }
            Ok::<(), std::io::Error>(())
        });

        let relay = spawn_event_relay(&self.phone, outbox.clone());

        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await.context("failed to read input")? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let reply = match serde_json::from_str::<BridgeInput>(line) {
                Ok(input) => {
                    log_debug!("bridge -> {input:?}");
                    self.dispatch(input).await
                }
                Err(err) => Some(BridgeOutput::failed(format!("unreadable line: {err}"))),
            };

            if let Some(reply) = reply {
                if outbox.send(reply).is_err() {
                    break;
                }
            }
        }

        log_info!("input closed, shutting down bridge");
        relay.abort();
        drop(outbox);
        drop(self);

        // Pending call timers keep the outbox alive for a while; do not wait on them.
        match tokio::time::timeout(DRAIN_TIMEOUT, writer).await {
            Ok(Ok(result)) => result.context("failed to write output"),
            Ok(Err(join_err)) => Err(anyhow!("output writer failed: {join_err}")),
            Err(_) => Ok(()),
        }
    }
}

/// Copies call events and reminder status changes into the outbox.
pub fn spawn_event_relay(phone: &Phone, outbox: Outbox) -> JoinHandle<()> {
    let mut calls = phone.calls().subscribe();
    let mut nag = phone.nag().subscribe_status();

    tokio::spawn(async move {
        loop {
            let output = tokio::select! {
                event = calls.recv() => match event {
                    Ok(event) => BridgeOutput::Call { event },
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        log_warn!("bridge skipped {missed} call events");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                changed = nag.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let status = *nag.borrow_and_update();
                    BridgeOutput::Nag { status }
                }
            };

            if outbox.send(output).is_err() {
                break;
            }
        }
    })
}
