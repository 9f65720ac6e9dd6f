use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    chatpilot::cli::main()
}
