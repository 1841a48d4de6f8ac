// Copyright 2026 Joyent, Inc.

//! A demo calculator service: `add` and `divide` plus a oneway `Log`
//! method, served over the binary protocol with framed transport.

use std::sync::{Arc, Mutex};

use clap::{Arg, ArgMatches, Command};
use slog::{error, info, o, Drain, Logger};
use tokio::net::TcpListener;

use thrift_rpc::codec::CodecRegistry;
use thrift_rpc::errors::HandlerError;
use thrift_rpc::metadata::{
    MethodMetadata, StructCategory, StructMetadata, ThriftType, TypeCatalog,
};
use thrift_rpc::server::{
    serve_connection, MethodProcessor, ServerConfig, ServiceProcessor,
};
use thrift_rpc::value::{StructValue, ThriftValue};

static APP: &str = "calcserve";
const DEFAULT_LISTEN: &str = "127.0.0.1:9090";

fn parse_opts(app: &'static str) -> ArgMatches {
    Command::new(app)
        .about("Demo Thrift calculator server")
        .arg(
            Arg::new("listen")
                .help("address and TCP port to listen on (default: 127.0.0.1:9090)")
                .long("listen")
                .short('l'),
        )
        .get_matches()
}

fn arg_i32(args: &[Option<ThriftValue>], index: usize) -> i32 {
    args.get(index)
        .and_then(|a| a.as_ref())
        .and_then(ThriftValue::as_i32)
        .unwrap_or(0)
}

fn calculator(registry: &Arc<CodecRegistry>, log: Logger) -> ServiceProcessor {
    let div_by_zero = registry
        .catalog()
        .struct_type("DivByZero", |_| {
            StructMetadata::builder("DivByZero", StructCategory::Exception)
                .field(1, "message", ThriftType::String)
                .build()
        })
        .expect("DivByZero metadata");

    let add = MethodProcessor::new(
        &MethodMetadata::builder("Calculator", "add")
            .param("a", ThriftType::I32)
            .param("b", ThriftType::I32)
            .returns(ThriftType::I32)
            .build()
            .expect("add metadata"),
        registry,
        Box::new(|args| {
            Ok(Some(ThriftValue::I32(arg_i32(&args, 0) + arg_i32(&args, 1))))
        }),
    )
    .expect("add processor");

    let divide = MethodProcessor::new(
        &MethodMetadata::builder("Calculator", "divide")
            .param("dividend", ThriftType::I32)
            .param("divisor", ThriftType::I32)
            .returns(ThriftType::I32)
            .throws(div_by_zero)
            .build()
            .expect("divide metadata"),
        registry,
        Box::new(|args| {
            let divisor = arg_i32(&args, 1);
            if divisor == 0 {
                return Err(HandlerError::thrown(
                    "DivByZero",
                    ThriftValue::Struct(
                        StructValue::new().with(1, "division by zero"),
                    ),
                ));
            }
            Ok(Some(ThriftValue::I32(arg_i32(&args, 0) / divisor)))
        }),
    )
    .expect("divide processor");

    let log_method = MethodProcessor::new(
        &MethodMetadata::builder("Calculator", "Log")
            .param("messages", ThriftType::list(ThriftType::String))
            .oneway()
            .build()
            .expect("Log metadata"),
        registry,
        Box::new(move |args| {
            if let Some(ThriftValue::List(items)) =
                args.get(0).and_then(|a| a.as_ref())
            {
                for item in items {
                    if let Some(message) = item.as_str() {
                        info!(log, "client log"; "message" => message);
                    }
                }
            }
            Ok(None)
        }),
    )
    .expect("Log processor");

    ServiceProcessor::new()
        .method(add)
        .method(divide)
        .method(log_method)
}

#[tokio::main]
async fn main() {
    let plain = slog_term::PlainSyncDecorator::new(std::io::stdout());
    let root_log = Logger::root(
        Mutex::new(slog_term::FullFormat::new(plain).build()).fuse(),
        o!("build-id" => "0.1.0"),
    );

    let matches = parse_opts(APP);
    let listen = matches
        .get_one::<String>("listen")
        .map(String::as_str)
        .unwrap_or(DEFAULT_LISTEN);

    let registry = Arc::new(CodecRegistry::new(Arc::new(TypeCatalog::new())));
    let processor =
        Arc::new(calculator(&registry, root_log.new(o!("method" => "Log"))));

    let listener = TcpListener::bind(listen).await.expect("failed to bind");
    info!(root_log, "listening for thrift requests"; "address" => listen);

    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                info!(root_log, "accepted connection"; "peer" => %peer);
                let processor = processor.clone();
                let process_log = root_log.clone();
                tokio::spawn(async move {
                    serve_connection(
                        socket,
                        processor,
                        ServerConfig::default(),
                        Some(&process_log),
                    )
                    .await;
                });
            }
            Err(e) => {
                error!(root_log, "failed to accept socket"; "err" => %e);
                break;
            }
        }
    }
}
