//! Command-line client for Microsoft 365: Microsoft Graph, SharePoint Online,
//! Teams, To Do and Microsoft Entra ID.

pub mod cmd;
pub mod config;
pub mod error;
pub mod graph;
