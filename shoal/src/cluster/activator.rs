//! Per-kind activation endpoint.
//!
//! Every member runs one activator actor per kind it supports, registered
//! as `partition-{kind}`. The activator gets or creates the actor for a
//! name and answers with its pid.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::actor::{Actor, ActorError, Context, Message, Pid, Props, SpawnError, Terminated};

/// Outcome of a cluster resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResponseStatusCode {
    /// The pid is valid.
    Ok,
    /// No alive member can host the kind.
    Unavailable,
    /// The activator did not answer in time.
    Timeout,
    /// The name is already registered on the owner; the pid is the existing one.
    ProcessNameAlreadyExists,
    /// Anything else went wrong.
    Error,
}

impl ResponseStatusCode {
    /// Whether this is [`ResponseStatusCode::Ok`].
    pub fn is_ok(self) -> bool {
        self == ResponseStatusCode::Ok
    }
}

impl fmt::Display for ResponseStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ResponseStatusCode::Ok => "ok",
            ResponseStatusCode::Unavailable => "unavailable",
            ResponseStatusCode::Timeout => "timeout",
            ResponseStatusCode::ProcessNameAlreadyExists => "process name already exists",
            ResponseStatusCode::Error => "error",
        };
        f.write_str(text)
    }
}

/// Ask the owner of `name` to get or create it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationRequest {
    /// Logical name.
    pub name: String,
    /// Kind to activate.
    pub kind: String,
}

/// Answer to an [`ActivationRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationResponse {
    /// The activation, when there is one.
    pub pid: Option<Pid>,
    /// Outcome.
    pub status_code: ResponseStatusCode,
}

/// Registered name of the activator for `kind`.
pub fn activator_name(kind: &str) -> String {
    format!("partition-{kind}")
}

/// Pid of the activator for `kind` on `member_address`.
pub fn activator_pid(member_address: &str, kind: &str) -> Pid {
    Pid::new(member_address, activator_name(kind))
}

pub(crate) struct Activator {
    kind: String,
    props: Props,
    activations: HashMap<String, Pid>,
}

impl Activator {
    pub(crate) fn props(kind: &str, props: Props) -> Props {
        let kind = kind.to_string();
        Props::from_producer(move || Activator {
            kind: kind.clone(),
            props: props.clone(),
            activations: HashMap::new(),
        })
    }

    fn activate(&mut self, ctx: &mut dyn Context, request: &ActivationRequest) -> ActivationResponse {
        if request.kind != self.kind {
            tracing::warn!(expected = %self.kind, kind = %request.kind, "activation request for another kind");
            return ActivationResponse {
                pid: None,
                status_code: ResponseStatusCode::Error,
            };
        }
        if let Some(pid) = self.activations.get(&request.name) {
            return ActivationResponse {
                pid: Some(pid.clone()),
                status_code: ResponseStatusCode::Ok,
            };
        }

        let root = ctx.system().root();
        match root.spawn_named(self.props.clone(), &request.name) {
            Ok(pid) => {
                tracing::debug!(name = %request.name, kind = %self.kind, pid = %pid, "activated");
                ctx.watch(&pid);
                self.activations.insert(request.name.clone(), pid.clone());
                ActivationResponse {
                    pid: Some(pid),
                    status_code: ResponseStatusCode::Ok,
                }
            }
            Err(SpawnError::NameExists(pid)) => ActivationResponse {
                pid: Some(pid),
                status_code: ResponseStatusCode::ProcessNameAlreadyExists,
            },
            Err(err) => {
                tracing::error!(name = %request.name, kind = %self.kind, error = %err, "activation failed");
                ActivationResponse {
                    pid: None,
                    status_code: ResponseStatusCode::Error,
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Actor for Activator {
    async fn receive(&mut self, ctx: &mut dyn Context) -> Result<(), ActorError> {
        let Some(message) = ctx.message() else {
            return Ok(());
        };
        if let Some(request) = message.downcast_ref::<ActivationRequest>() {
            let request = request.clone();
            let response = self.activate(ctx, &request);
            ctx.respond(Message::new(response));
        } else if let Some(terminated) = message.downcast_ref::<Terminated>() {
            let who = terminated.who().clone();
            self.activations.retain(|_, pid| *pid != who);
        }
        Ok(())
    }
}
