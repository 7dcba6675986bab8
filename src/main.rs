use std::process::ExitCode;

use luabridge::{host_fn, CallFlags, Engine, Value};

fn main() -> ExitCode {
    env_logger::init();

    let mut args = std::env::args();
    let program = args.next().unwrap_or_else(|| "luabridge".into());
    let Some(filename) = args.next() else {
        println!("{program}: expected argument <filename>");
        return ExitCode::FAILURE;
    };

    let engine = Engine::new();
    if let Err(e) = engine.load_script(&filename) {
        println!("error: {e}");
        return ExitCode::FAILURE;
    }
    println!("ok!");
    println!("{}", engine.is_loaded(&filename));

    let ping = host_fn(|_| {
        log::info!("[host] ping");
        println!("PONG :)");
        Ok(Value::None)
    });
    if let Err(e) = engine.register_global_function("ping", ping) {
        println!("error: {e}");
        return ExitCode::FAILURE;
    }

    let broadcast = engine.call_in_all_scripts("Test", &[], CallFlags::IGNORE_NOT_EXISTS);
    if broadcast.all_ok() {
        println!("all OK!");
    } else {
        println!("not all returned OK");
        for (path, result) in &broadcast.results {
            match result {
                Ok(_) => println!("{}: OK", path.display()),
                Err(e) => println!("{}: {e}", path.display()),
            }
        }
    }

    ExitCode::SUCCESS
}
