//! Single-consumer loop owning registration, deregistration and global broadcast.

use std::sync::Arc;

use ractor::{Actor, ActorProcessingErr, ActorRef};

use crate::hub::HubShared;
use crate::messages::SchedulerMessage;

/// Actor that applies lifecycle changes and global broadcasts in the order
/// they were submitted.
pub struct BroadcastScheduler;

impl Actor for BroadcastScheduler {
    type Msg = SchedulerMessage;
    type State = Arc<HubShared>;
    type Arguments = Arc<HubShared>;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting broadcast scheduler for {}", args.config.service_name);
        Ok(args)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SchedulerMessage::Register {
                session,
                permit: _permit,
                reply,
            } => {
                let registered = state.register(session);
                let _ = reply.send(registered);
            }

            SchedulerMessage::Unregister {
                session_id,
                permit: _permit,
                reply,
            } => {
                let removed = state.unregister(session_id);
                let _ = reply.send(removed);
            }

            SchedulerMessage::Broadcast {
                message,
                permit: _permit,
            } => {
                let outcome = state.broadcast_all(&message);
                tracing::debug!(
                    "Broadcast delivered to {} sessions, {} dropped",
                    outcome.delivered,
                    outcome.evicted.len()
                );
            }

            SchedulerMessage::Shutdown {
                permit: _permit,
                reply,
            } => {
                tracing::info!("Shutting down broadcast scheduler");
                let closed = state
                    .registry
                    .ids()
                    .into_iter()
                    .filter(|id| state.unregister(*id))
                    .count();
                let _ = reply.send(closed);
                myself.stop(None);
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        tracing::info!(
            "Broadcast scheduler stopped with {} sessions registered",
            state.registry.len()
        );
        Ok(())
    }
}
