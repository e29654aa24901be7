//! Merging a freshly loaded snapshot into the live configuration.
//!
//! Every scalar setting is described once in `field_table`. Merging walks
//! the table, then reconciles the address list. The merge only rewrites the
//! authoritative settings; starting and stopping forwarding workers is the
//! pool's job (`WorkerPool::reconcile`).

use crate::config::schema::ConfigSnapshot;
use crate::observability::LogRouting;

/// One setting that changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub name: &'static str,
    pub old: String,
    pub new: String,
}

/// One change to the address list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressChange {
    /// Same position, different address.
    Changed { index: usize, old: String, new: String },
    /// Position only present in the old list.
    Stopped { index: usize, address: String },
    /// Position only present in the new list.
    Started { index: usize, address: String },
}

/// Everything a merge changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub fields: Vec<FieldChange>,
    pub addresses: Vec<AddressChange>,
}

impl MergeOutcome {
    pub fn changed(&self) -> bool {
        !self.fields.is_empty() || !self.addresses.is_empty()
    }

    /// Number of destinations that are no longer configured.
    pub fn stopped(&self) -> usize {
        self.addresses
            .iter()
            .filter(|c| matches!(c, AddressChange::Stopped { .. }))
            .count()
    }
}

type ApplyFn = fn(&mut ConfigSnapshot, &mut ConfigSnapshot) -> Option<FieldChange>;
type HookFn = fn(&ConfigSnapshot, &dyn LogRouting);

/// How to compare and apply one setting.
struct FieldDescriptor {
    name: &'static str,
    /// Moves the loaded value into the live snapshot if they differ.
    apply: ApplyFn,
    /// Runs right after a change to this field, before the change is
    /// logged and before any later field is looked at.
    after_apply: Option<HookFn>,
}

macro_rules! scalar_field {
    ($name:literal, $($path:ident).+) => {
        FieldDescriptor {
            name: $name,
            apply: |live, loaded| {
                if live.$($path).+ == loaded.$($path).+ {
                    return None;
                }
                let change = FieldChange {
                    name: $name,
                    old: live.$($path).+.to_string(),
                    new: loaded.$($path).+.to_string(),
                };
                live.$($path).+ = loaded.$($path).+;
                Some(change)
            },
            after_apply: None,
        }
    };
}

// The loaded snapshot gives up its string; its slot is left empty.
macro_rules! string_field {
    ($name:literal, $($path:ident).+) => {
        FieldDescriptor {
            name: $name,
            apply: |live, loaded| {
                if live.$($path).+ == loaded.$($path).+ {
                    return None;
                }
                let new = std::mem::take(&mut loaded.$($path).+);
                let old = std::mem::replace(&mut live.$($path).+, new);
                Some(FieldChange {
                    name: $name,
                    new: live.$($path).+.clone(),
                    old,
                })
            },
            after_apply: None,
        }
    };
}

fn field_table() -> Vec<FieldDescriptor> {
    let mut fields = vec![
        FieldDescriptor {
            after_apply: Some(|live, routing| routing.reopen(live.log_to_stderr)),
            ..scalar_field!("log_to_stderr", log_to_stderr)
        },
        scalar_field!("tcp_send_timeout_sec", tcp_send_timeout_sec),
        scalar_field!("polling_interval_ms", polling_interval_ms),
        scalar_field!("sleep_after_disaster_ms", sleep_after_disaster_ms),
        scalar_field!("server_socket_rcvbuf_bytes", server_socket_rcvbuf_bytes),
        string_field!("spillway_root", spillway_root),
        scalar_field!("spill_usec", spill_usec),
        string_field!("telemetry.addr", telemetry.addr),
        string_field!("telemetry.target", telemetry.target),
        scalar_field!("telemetry.send_interval_ms", telemetry.send_interval_ms),
        scalar_field!("telemetry.sleep_poll_interval_ms", telemetry.sleep_poll_interval_ms),
        scalar_field!("telemetry.add_ports", telemetry.add_ports),
    ];
    // Fields with hooks go first so e.g. log routing is already switched
    // when the remaining changes are logged.
    fields.sort_by_key(|f| f.after_apply.is_none());
    fields
}

fn role(index: usize) -> &'static str {
    if index == 0 {
        "listener"
    } else {
        "forward"
    }
}

/// What appearing at position `index` means for `address`.
fn start_notice(index: usize, address: &str) -> String {
    if index == 0 {
        format!("Setting listener to {address}")
    } else {
        format!("Starting forward to {address}")
    }
}

/// Apply every difference between `loaded` and `live` to `live`.
///
/// `first_load` only changes the wording of log lines.
pub fn merge_config(
    live: &mut ConfigSnapshot,
    mut loaded: ConfigSnapshot,
    first_load: bool,
    routing: &dyn LogRouting,
) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();

    for field in field_table() {
        let Some(change) = (field.apply)(live, &mut loaded) else {
            continue;
        };
        if let Some(hook) = field.after_apply {
            hook(live, routing);
        }
        if first_load {
            tracing::info!(field = field.name, value = %change.new, "Setting config value");
        } else {
            tracing::info!(
                field = field.name,
                old = %change.old,
                new = %change.new,
                "Changing config value"
            );
        }
        outcome.fields.push(change);
    }

    merge_addresses(
        &mut live.addresses,
        std::mem::take(&mut loaded.addresses),
        first_load,
        &mut outcome,
    );
    outcome
}

fn merge_addresses(
    live: &mut Vec<String>,
    new: Vec<String>,
    first_load: bool,
    outcome: &mut MergeOutcome,
) {
    for (index, old) in live.iter().enumerate() {
        match new.get(index) {
            Some(address) if address == old => {}
            Some(address) => {
                if first_load {
                    tracing::info!(role = role(index), %address, "Setting socket address");
                } else {
                    tracing::info!(
                        role = role(index),
                        %old,
                        new = %address,
                        "Changing socket address"
                    );
                }
                outcome.addresses.push(AddressChange::Changed {
                    index,
                    old: old.clone(),
                    new: address.clone(),
                });
            }
            None => {
                tracing::info!(role = role(index), address = %old, "Stopping forward to {}", old);
                outcome.addresses.push(AddressChange::Stopped {
                    index,
                    address: old.clone(),
                });
            }
        }
    }

    for (index, address) in new.iter().enumerate().skip(live.len()) {
        tracing::info!(role = role(index), %address, "{}", start_notice(index, address));
        outcome.addresses.push(AddressChange::Started {
            index,
            address: address.clone(),
        });
    }

    *live = new;
}
