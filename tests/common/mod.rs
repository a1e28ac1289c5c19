//! Byte-level class-file assembler for integration tests
//!
//! Deliberately independent of the crate's own encoder so that round-trip
//! and injection tests compare against bytes nobody in `src/` produced.

#![allow(dead_code)]

use std::collections::HashMap;

use perfmon::classfile::instruction::Operand;
use perfmon::classfile::opcodes;
use perfmon::model::{BehaviorDescriptor, ClassDescriptor};

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_SUPER: u16 = 0x0020;
pub const ACC_NATIVE: u16 = 0x0100;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;

/// Body of one method as raw bytes
#[derive(Debug, Clone, Default)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub bytes: Vec<u8>,
    /// start_pc, end_pc, handler_pc, catch_type
    pub handlers: Vec<[u16; 4]>,
    /// name index, payload
    pub attributes: Vec<(u16, Vec<u8>)>,
}

pub struct ClassBuilder {
    major: u16,
    access: u16,
    pool: Vec<u8>,
    next_index: u16,
    utf8s: HashMap<String, u16>,
    classes: HashMap<String, u16>,
    this_class: u16,
    super_class: u16,
    methods: Vec<Vec<u8>>,
}

impl ClassBuilder {
    /// `name extends java/lang/Object`, version 49
    pub fn new(name: &str) -> Self {
        let mut builder = Self::root(name);
        builder.super_class = builder.class("java/lang/Object");
        builder
    }

    /// A class without a superclass
    pub fn root(name: &str) -> Self {
        let mut builder = ClassBuilder {
            major: 49,
            access: ACC_PUBLIC | ACC_SUPER,
            pool: Vec::new(),
            next_index: 1,
            utf8s: HashMap::new(),
            classes: HashMap::new(),
            this_class: 0,
            super_class: 0,
            methods: Vec::new(),
        };
        builder.this_class = builder.class(name);
        builder
    }

    pub fn version(&mut self, major: u16) -> &mut Self {
        self.major = major;
        self
    }

    pub fn access(&mut self, access: u16) -> &mut Self {
        self.access = access;
        self
    }

    fn push_entry(&mut self, bytes: &[u8], slots: u16) -> u16 {
        let index = self.next_index;
        self.pool.extend_from_slice(bytes);
        self.next_index += slots;
        index
    }

    pub fn utf8(&mut self, value: &str) -> u16 {
        if let Some(&index) = self.utf8s.get(value) {
            return index;
        }
        let mut bytes = vec![1];
        bytes.extend_from_slice(&(value.len() as u16).to_be_bytes());
        bytes.extend_from_slice(value.as_bytes());
        let index = self.push_entry(&bytes, 1);
        self.utf8s.insert(value.to_string(), index);
        index
    }

    pub fn class(&mut self, name: &str) -> u16 {
        if let Some(&index) = self.classes.get(name) {
            return index;
        }
        let name_index = self.utf8(name);
        let mut bytes = vec![7];
        bytes.extend_from_slice(&name_index.to_be_bytes());
        let index = self.push_entry(&bytes, 1);
        self.classes.insert(name.to_string(), index);
        index
    }

    pub fn string(&mut self, value: &str) -> u16 {
        let utf8 = self.utf8(value);
        let mut bytes = vec![8];
        bytes.extend_from_slice(&utf8.to_be_bytes());
        self.push_entry(&bytes, 1)
    }

    pub fn integer(&mut self, value: i32) -> u16 {
        let mut bytes = vec![3];
        bytes.extend_from_slice(&value.to_be_bytes());
        self.push_entry(&bytes, 1)
    }

    pub fn long(&mut self, value: i64) -> u16 {
        let mut bytes = vec![5];
        bytes.extend_from_slice(&value.to_be_bytes());
        self.push_entry(&bytes, 2)
    }

    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        let mut bytes = vec![12];
        bytes.extend_from_slice(&name.to_be_bytes());
        bytes.extend_from_slice(&descriptor.to_be_bytes());
        self.push_entry(&bytes, 1)
    }

    fn member(&mut self, tag: u8, class: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.class(class);
        let nat = self.name_and_type(name, descriptor);
        let mut bytes = vec![tag];
        bytes.extend_from_slice(&class.to_be_bytes());
        bytes.extend_from_slice(&nat.to_be_bytes());
        self.push_entry(&bytes, 1)
    }

    pub fn fieldref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        self.member(9, class, name, descriptor)
    }

    pub fn methodref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        self.member(10, class, name, descriptor)
    }

    pub fn method(&mut self, access: u16, name: &str, descriptor: &str, code: Option<Code>) {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        let mut out = Vec::new();
        out.extend_from_slice(&access.to_be_bytes());
        out.extend_from_slice(&name.to_be_bytes());
        out.extend_from_slice(&descriptor.to_be_bytes());
        match code {
            None => out.extend_from_slice(&0u16.to_be_bytes()),
            Some(code) => {
                let code_name = self.utf8("Code");
                out.extend_from_slice(&1u16.to_be_bytes());
                out.extend_from_slice(&code_name.to_be_bytes());
                let body = code_attribute(&code);
                out.extend_from_slice(&(body.len() as u32).to_be_bytes());
                out.extend_from_slice(&body);
            }
        }
        self.methods.push(out);
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&self.major.to_be_bytes());
        out.extend_from_slice(&self.next_index.to_be_bytes());
        out.extend_from_slice(&self.pool);
        out.extend_from_slice(&self.access.to_be_bytes());
        out.extend_from_slice(&self.this_class.to_be_bytes());
        out.extend_from_slice(&self.super_class.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes()); // interfaces
        out.extend_from_slice(&0u16.to_be_bytes()); // fields
        out.extend_from_slice(&(self.methods.len() as u16).to_be_bytes());
        for method in &self.methods {
            out.extend_from_slice(method);
        }
        out.extend_from_slice(&0u16.to_be_bytes()); // attributes
        out
    }
}

fn code_attribute(code: &Code) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&code.max_stack.to_be_bytes());
    out.extend_from_slice(&code.max_locals.to_be_bytes());
    out.extend_from_slice(&(code.bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(&code.bytes);
    out.extend_from_slice(&(code.handlers.len() as u16).to_be_bytes());
    for handler in &code.handlers {
        for value in handler {
            out.extend_from_slice(&value.to_be_bytes());
        }
    }
    out.extend_from_slice(&(code.attributes.len() as u16).to_be_bytes());
    for (name, data) in &code.attributes {
        out.extend_from_slice(&name.to_be_bytes());
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(data);
    }
    out
}

/// `demo/Calc` with a constructor, a native method, a class initializer and
///
/// ```java
/// static int pick(int x) {
///     if (x == 0) return 0;
///     try { return risky(x); } catch (RuntimeException e) { throw e; }
/// }
/// static int risky(int x) { return x; }
/// ```
///
/// From version 50 on, `pick` carries a StackMapTable.
pub fn calc_class(major: u16) -> Vec<u8> {
    let mut b = ClassBuilder::new("demo/Calc");
    b.version(major);
    let object_init = b.methodref("java/lang/Object", "<init>", "()V");
    let risky = b.methodref("demo/Calc", "risky", "(I)I");
    let rte = b.class("java/lang/RuntimeException");
    let line_numbers = b.utf8("LineNumberTable");
    let stack_map = b.utf8("StackMapTable");

    let [init_hi, init_lo] = object_init.to_be_bytes();
    b.method(
        ACC_PUBLIC,
        "<init>",
        "()V",
        Some(Code {
            max_stack: 1,
            max_locals: 1,
            bytes: vec![0x2a, 0xb7, init_hi, init_lo, 0xb1],
            ..Code::default()
        }),
    );

    let [r_hi, r_lo] = risky.to_be_bytes();
    let mut attributes = vec![(line_numbers, vec![0, 2, 0, 0, 0, 10, 0, 6, 0, 12])];
    if major >= 50 {
        let [t_hi, t_lo] = rte.to_be_bytes();
        attributes.push((stack_map, vec![0, 2, 6, 68, 7, t_hi, t_lo]));
    }
    b.method(
        ACC_STATIC,
        "pick",
        "(I)I",
        Some(Code {
            max_stack: 1,
            max_locals: 2,
            bytes: vec![
                0x1a, // iload_0
                0x9a, 0x00, 0x05, // ifne 6
                0x03, // iconst_0
                0xac, // ireturn
                0x1a, // iload_0
                0xb8, r_hi, r_lo, // invokestatic risky
                0xac, // ireturn
                0x4c, // astore_1
                0x2b, // aload_1
                0xbf, // athrow
            ],
            handlers: vec![[6, 11, 11, rte]],
            attributes,
        }),
    );

    b.method(
        ACC_STATIC,
        "risky",
        "(I)I",
        Some(Code {
            max_stack: 1,
            max_locals: 1,
            bytes: vec![0x1a, 0xac],
            ..Code::default()
        }),
    );
    b.method(ACC_PUBLIC | ACC_NATIVE, "nativeCall", "()V", None);
    b.method(
        ACC_STATIC,
        "<clinit>",
        "()V",
        Some(Code {
            max_stack: 0,
            max_locals: 0,
            bytes: vec![0xb1],
            ..Code::default()
        }),
    );
    b.build()
}

/// Interface `demo/Shape` with an abstract method and a static method body
pub fn shape_interface() -> Vec<u8> {
    let mut b = ClassBuilder::new("demo/Shape");
    b.version(52)
        .access(ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT);
    b.method(ACC_PUBLIC | ACC_ABSTRACT, "area", "()D", None);
    b.method(
        ACC_PUBLIC | ACC_STATIC,
        "unit",
        "()I",
        Some(Code {
            max_stack: 1,
            max_locals: 0,
            bytes: vec![0x04, 0xac],
            ..Code::default()
        }),
    );
    b.build()
}

/// Abstract class whose only methods have no body
pub fn bodiless_class() -> Vec<u8> {
    let mut b = ClassBuilder::new("demo/Base");
    b.access(ACC_PUBLIC | ACC_SUPER | ACC_ABSTRACT);
    b.method(ACC_PUBLIC | ACC_ABSTRACT, "run", "()V", None);
    b.method(ACC_PUBLIC | ACC_NATIVE, "poke", "(J)V", None);
    b.build()
}

/// Number of `invokestatic`/`getstatic` instructions in `behavior` that
/// reference `owner.name`
pub fn count_refs(
    class: &ClassDescriptor,
    behavior: &BehaviorDescriptor,
    opcode: u8,
    owner: &str,
    name: &str,
) -> usize {
    let Some(body) = behavior.body() else {
        return 0;
    };
    body.instructions
        .iter()
        .filter(|insn| insn.opcode == opcode)
        .filter(|insn| match insn.operand {
            Operand::Constant(index) => class
                .pool
                .member_ref(index)
                .map(|m| m.class_name == owner && m.name == name)
                .unwrap_or(false),
            _ => false,
        })
        .count()
}

pub fn nano_time_calls(class: &ClassDescriptor, behavior: &BehaviorDescriptor) -> usize {
    count_refs(class, behavior, opcodes::INVOKESTATIC, "java/lang/System", "nanoTime")
}

pub fn print_streams(class: &ClassDescriptor, behavior: &BehaviorDescriptor) -> usize {
    count_refs(class, behavior, opcodes::GETSTATIC, "java/lang/System", "out")
        + count_refs(class, behavior, opcodes::GETSTATIC, "java/lang/System", "err")
}

pub fn behavior<'a>(class: &'a ClassDescriptor, name: &str) -> &'a BehaviorDescriptor {
    class
        .behaviors
        .iter()
        .find(|b| b.name == name)
        .unwrap_or_else(|| panic!("no behavior {}", name))
}
