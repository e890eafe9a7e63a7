//! Core data models for mailbox operations.

mod email;

pub use email::{
    ClientType, DateRange, EmailSummary, FetchEmailsInput, FetchEmailsOutput, MailCredentials,
    MarkEmailsReadInput, SendEmailInput, StatusOutput,
};
