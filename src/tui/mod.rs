pub mod mail_browser;


pub use mail_browser::MailBrowser;
