pub mod chat_cmd;
pub mod doctor;
pub mod gateway;
pub mod login;
pub mod onboard;
pub mod resolve_cmd;
