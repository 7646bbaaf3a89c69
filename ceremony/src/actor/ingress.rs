use crate::{Command, Error, Event, Identity, Phase, Response, Round, RoundId};
use futures::{
    channel::{mpsc, oneshot},
    SinkExt,
};

/// Message types that can be sent to the [Mailbox].
pub enum Message {
    /// Apply a command to the ceremony.
    Command {
        command: Command,
        response: oneshot::Sender<Result<Response, Error>>,
    },

    /// Receive every event published after the request is processed.
    Subscribe {
        response: oneshot::Sender<mpsc::UnboundedReceiver<Event>>,
    },
}

/// Ingress mailbox for [Actor](super::Actor).
///
/// Every method fails with [Error::Closed] once the actor has stopped.
#[derive(Clone)]
pub struct Mailbox {
    sender: mpsc::Sender<Message>,
}

impl Mailbox {
    pub(super) fn new(sender: mpsc::Sender<Message>) -> Self {
        Self { sender }
    }

    /// Apply a command and wait for its outcome.
    pub async fn execute(&mut self, command: Command) -> Result<Response, Error> {
        let (response, receiver) = oneshot::channel();
        self.sender
            .send(Message::Command { command, response })
            .await
            .map_err(|_| Error::Closed)?;
        receiver.await.map_err(|_| Error::Closed)?
    }

    /// Subscribe to ceremony events.
    pub async fn subscribe(&mut self) -> Result<mpsc::UnboundedReceiver<Event>, Error> {
        let (response, receiver) = oneshot::channel();
        self.sender
            .send(Message::Subscribe { response })
            .await
            .map_err(|_| Error::Closed)?;
        receiver.await.map_err(|_| Error::Closed)
    }

    pub async fn register(&mut self, identity: Identity) -> Result<(), Error> {
        match self.execute(Command::Register { identity }).await? {
            Response::Registered => Ok(()),
            _ => Err(Error::UnexpectedResponse("register")),
        }
    }

    pub async fn start_key_generation(&mut self) -> Result<RoundId, Error> {
        match self.execute(Command::StartKeyGeneration).await? {
            Response::Started(round) => Ok(round),
            _ => Err(Error::UnexpectedResponse("start_key_generation")),
        }
    }

    pub async fn submit_commitment(
        &mut self,
        round: RoundId,
        identity: Identity,
        commitment: crate::Commitment,
    ) -> Result<(), Error> {
        let command = Command::SubmitCommitment {
            round,
            identity,
            commitment,
        };
        match self.execute(command).await? {
            Response::Accepted => Ok(()),
            _ => Err(Error::UnexpectedResponse("submit_commitment")),
        }
    }

    pub async fn submit_share(
        &mut self,
        round: RoundId,
        from: Identity,
        to: Identity,
        share: crate::Share,
    ) -> Result<(), Error> {
        let command = Command::SubmitShare {
            round,
            from,
            to,
            share,
        };
        match self.execute(command).await? {
            Response::Accepted => Ok(()),
            _ => Err(Error::UnexpectedResponse("submit_share")),
        }
    }

    pub async fn advance_round(&mut self, round: RoundId) -> Result<Phase, Error> {
        match self.execute(Command::AdvanceRound { round }).await? {
            Response::Advanced(phase) => Ok(phase),
            _ => Err(Error::UnexpectedResponse("advance_round")),
        }
    }

    pub async fn abort(&mut self, round: RoundId, reason: impl Into<String>) -> Result<(), Error> {
        let command = Command::Abort {
            round,
            reason: reason.into(),
        };
        match self.execute(command).await? {
            Response::Aborted => Ok(()),
            _ => Err(Error::UnexpectedResponse("abort")),
        }
    }

    pub async fn get_participants(&mut self) -> Result<Vec<Identity>, Error> {
        match self.execute(Command::GetParticipants).await? {
            Response::Participants(participants) => Ok(participants),
            _ => Err(Error::UnexpectedResponse("get_participants")),
        }
    }

    pub async fn get_round(&mut self, round: RoundId) -> Result<Round, Error> {
        match self.execute(Command::GetRound { round }).await? {
            Response::Round(round) => Ok(*round),
            _ => Err(Error::UnexpectedResponse("get_round")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks;
    use commonware_runtime::{deterministic, Runner, Spawner};
    use futures::StreamExt;

    #[test]
    fn test_mismatched_response() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let (sender, mut receiver) = mpsc::channel(1);
            let mut mailbox = Mailbox::new(sender);

            // Answer every command with the wrong response
            context.spawn(|_| async move {
                while let Some(message) = receiver.next().await {
                    if let Message::Command { response, .. } = message {
                        let _ = response.send(Ok(Response::Aborted));
                    }
                }
            });
            assert!(matches!(
                mailbox.register(mocks::identity(1)).await,
                Err(Error::UnexpectedResponse("register"))
            ));
            assert!(matches!(
                mailbox.get_round(0).await,
                Err(Error::UnexpectedResponse("get_round"))
            ));
        });
    }
}
