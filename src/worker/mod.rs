pub mod chat_worker;

pub use chat_worker::ChatWorker;
