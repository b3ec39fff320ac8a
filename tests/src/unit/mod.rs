mod client_tests;
mod session_tests;
mod stream_tests;
