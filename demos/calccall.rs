// Copyright 2026 Joyent, Inc.

//! Command-line tool for calling the demo calculator service.

use std::net::SocketAddr;
use std::process;
use std::sync::Arc;

use clap::{Arg, ArgMatches, Command};

use thrift_rpc::client::{
    ClientConfig, MethodHandler, SequenceId, TcpChannel,
};
use thrift_rpc::RequestChannel;
use thrift_rpc::codec::CodecRegistry;
use thrift_rpc::errors::Error;
use thrift_rpc::metadata::{
    MethodMetadata, StructCategory, StructMetadata, ThriftType, TypeCatalog,
};
use thrift_rpc::value::ThriftValue;

static APP: &str = "calccall";
static DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 9090;

fn parse_opts(app: &'static str) -> ArgMatches {
    Command::new(app)
        .about("Command-line tool for making a calculator RPC method call")
        .arg(
            Arg::new("host")
                .help("DNS name or IP address for remote server")
                .long("host")
                .short('H'),
        )
        .arg(
            Arg::new("port")
                .help("TCP port for remote server (Default: 9090)")
                .long("port")
                .short('p'),
        )
        .arg(
            Arg::new("method")
                .help("Name of remote RPC method call (add or divide)")
                .long("method")
                .short('m')
                .required(true),
        )
        .arg(
            Arg::new("args")
                .help("two integer arguments for the method call")
                .long("args")
                .num_args(2)
                .required(true),
        )
        .get_matches()
}

fn method_metadata(method: &str, catalog: &TypeCatalog) -> MethodMetadata {
    match method {
        "add" => MethodMetadata::builder("Calculator", "add")
            .param("a", ThriftType::I32)
            .param("b", ThriftType::I32)
            .returns(ThriftType::I32)
            .build()
            .expect("add metadata"),
        "divide" => {
            let div_by_zero = catalog
                .struct_type("DivByZero", |_| {
                    StructMetadata::builder(
                        "DivByZero",
                        StructCategory::Exception,
                    )
                    .field(1, "message", ThriftType::String)
                    .build()
                })
                .expect("DivByZero metadata");
            MethodMetadata::builder("Calculator", "divide")
                .param("dividend", ThriftType::I32)
                .param("divisor", ThriftType::I32)
                .returns(ThriftType::I32)
                .throws(div_by_zero)
                .build()
                .expect("divide metadata")
        }
        other => {
            eprintln!("Unsupported method: {}", other);
            process::exit(1)
        }
    }
}

#[tokio::main]
async fn main() {
    let matches = parse_opts(APP);
    let host = matches
        .get_one::<String>("host")
        .map(String::as_str)
        .unwrap_or(DEFAULT_HOST);
    let port = matches
        .get_one::<String>("port")
        .map(|p| p.parse::<u16>().unwrap_or(DEFAULT_PORT))
        .unwrap_or(DEFAULT_PORT);
    let addr = format!("{}:{}", host, port)
        .parse::<SocketAddr>()
        .unwrap_or_else(|e| {
            eprintln!(
                "Failed to parse host and port as valid socket address: {}",
                e
            );
            process::exit(1)
        });

    let method = matches
        .get_one::<String>("method")
        .expect("method is required");
    let args: Vec<ThriftValue> = matches
        .get_many::<String>("args")
        .expect("args are required")
        .map(|raw| {
            ThriftValue::I32(raw.parse::<i32>().unwrap_or_else(|e| {
                eprintln!("Failed to parse argument {}: {}", raw, e);
                process::exit(1)
            }))
        })
        .collect();

    let registry = CodecRegistry::new(Arc::new(TypeCatalog::new()));
    let metadata = method_metadata(method, registry.catalog());
    let handler = MethodHandler::new(&metadata, &registry)
        .expect("method handler");

    let channel = TcpChannel::connect(&addr, &ClientConfig::default(), None)
        .await
        .unwrap_or_else(|e| {
            eprintln!("Failed to connect to server: {}", e);
            process::exit(1)
        });

    let mut sequence_ids = SequenceId::new();
    let seq = sequence_ids.next().expect("sequence id");
    match handler.invoke(&channel, seq, &args).await {
        Ok(Some(result)) => println!("{:?}", result),
        Ok(None) => println!("ok"),
        Err(Error::Declared { value, .. }) => {
            eprintln!("Remote exception: {:?}", value);
        }
        Err(e) => eprintln!("Error: {}", e),
    }

    channel.close();
}
