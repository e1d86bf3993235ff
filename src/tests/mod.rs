mod test_headers;
mod test_rate_state;
