//! Built-in RenderScript debugger tests.

use super::{DebugTest, TestSpec};

const STATUS: &str = "language renderscript status";
const RUNTIME_DISCOVERED: [&str; 2] = ["Runtime Library discovered", "Runtime Driver discovered"];
const STOPPED_AT_BREAKPOINT: [&str; 3] = ["resuming", "stopped", "stop reason = breakpoint"];

/// Every built-in test, in run order.
pub fn builtin() -> Vec<TestSpec> {
    vec![
        cmd_language(),
        cmd_language_subcmds_debug(),
        breakpoint_fileline_debug(),
        breakpoint_kernel_debug_2(),
        cmd_backtrace_function(),
        read_global(),
        read_local(),
        read_scalar(),
        source_step(),
    ]
}

/// Look a built-in test up by name.
pub fn find(name: &str) -> Option<TestSpec> {
    builtin().into_iter().find(|test| test.name() == name)
}

fn cmd_language() -> TestSpec {
    TestSpec::new("test_cmd_language")
        .step_quiet("language")
        .step("language renderscript", &["kernel", "context", "module", "status"])
}

fn cmd_language_subcmds_debug() -> TestSpec {
    TestSpec::new("test_cmd_language_subcmds_debug")
        .target("JavaDebugWaitAttach")
        .step("language", &[])
        .step(STATUS, &RUNTIME_DISCOVERED)
        .step("breakpoint set --file simple.rs --line 8", &["(pending)"])
        .step("process continue", &[])
        .step("language renderscript kernel", &["breakpoint", "list"])
        .step(
            "language renderscript kernel list",
            &["RenderScript Kernels", "Resource", "root"],
        )
        .step("language renderscript context", &["dump"])
        .step(
            "language renderscript context dump",
            &["Inferred RenderScript Contexts"],
        )
        .step("language renderscript module", &["dump", "probe"])
        .step(
            "language renderscript module dump",
            &[
                "RenderScript Modules:",
                "Debug info loaded",
                "Globals:",
                "Kernels:",
                "java_package_name:",
                "version:",
            ],
        )
        .step(
            STATUS,
            &[
                "Runtime Library discovered",
                "Runtime Driver discovered",
                "Runtime functions hooked",
                "rsdAllocationInit",
                "rsdAllocationRead2D",
                "rsdScriptInit",
                "rsdScriptInvokeForEach",
                "rsdScriptInvokeForEachMulti",
                "rsdScriptInvokeFunction",
                "rsdScriptSetGlobalVar",
            ],
        )
}

fn breakpoint_fileline_debug() -> TestSpec {
    TestSpec::new("test_breakpoint_fileline_debug")
        .target("JavaDebugWaitAttach")
        .step(STATUS, &RUNTIME_DISCOVERED)
        .step("breakpoint set --file simple.rs --line 8", &["(pending)"])
        .step("process continue", &[])
        .step(
            "bt",
            &["librs.simple.so", "simple_kernel", "stop reason = breakpoint"],
        )
        .step("breakpoint list", &["simple.rs", "resolved = 1"])
        .step("process status", &["stopped", "stop reason = breakpoint"])
        .step(
            "language renderscript kernel breakpoint simple_kernel",
            &[
                "simple_kernel",
                "within script",
                "simple",
                "Breakpoint(s) created",
            ],
        )
        .step("breakpoint list", &[])
}

fn breakpoint_kernel_debug_2() -> TestSpec {
    TestSpec::new("test_breakpoint_kernel_debug_2")
        .target("JavaInfiniteLoop")
        .step("language", &[])
        .step("b simple_kernel", &[""])
        .step("breakpoint list", &["simple_kernel", "resolved"])
        .step("process continue", &STOPPED_AT_BREAKPOINT)
        .step(
            "bt",
            &[
                "stop reason = breakpoint",
                "frame #0:",
                "librs.infiniteloop.so",
                "infiniteLoop.rs:28",
                "simple_kernel",
            ],
        )
        .step("breakpoint list", &["resolved = 1"])
        .step(
            "process status",
            &["stopped", ".so`simple_kernel", "stop reason = breakpoint"],
        )
}

fn cmd_backtrace_function() -> TestSpec {
    TestSpec::new("test_cmd_backtrace_function")
        .target("JavaFunction")
        .step("language", &[])
        .step(STATUS, &RUNTIME_DISCOVERED)
        .step("b simple_kernel", &["Breakpoint 1", "(pending)"])
        .step("process continue", &STOPPED_AT_BREAKPOINT)
        // libRSCpuRef, kernel.expand and the kernel
        .step(
            "bt",
            &[
                "stop reason = breakpoint",
                "frame #2:",
                "librs.function.so",
                "function.rs:14",
                "simple_kernel",
            ],
        )
        .step("breakpoint delete 1", &["1 breakpoints deleted"])
        .step("b getColour", &["Breakpoint 2", "getColour"])
        .step("breakpoint list", &["getColour", "resolved"])
        .step("process continue", &STOPPED_AT_BREAKPOINT)
        .step(
            "bt",
            &[
                "stop reason = breakpoint",
                "frame #3:",
                "librs.function.so",
                "function.rs:9",
                "getColour",
            ],
        )
}

/// Globals of `scalars.rs`: name, type, printed value.
const SCALAR_GLOBALS: [(&str, &str, &str); 6] = [
    ("c", "signed char", "'\\x10'"),
    ("s", "short", "256"),
    ("i", "int", "4096"),
    ("l", "long long", "65536"),
    ("f", "float", "2"),
    ("d", "double", "2"),
];

fn read_global() -> TestSpec {
    let listing: Vec<String> = SCALAR_GLOBALS
        .iter()
        .map(|(name, ty, value)| format!("({ty}) {name} = {value}"))
        .collect();
    let listing: Vec<&str> = listing.iter().map(String::as_str).collect();

    let mut spec = TestSpec::new("test_read_global")
        .target("GlobalScalarVariables")
        .step(STATUS, &RUNTIME_DISCOVERED)
        .step("b simple_kernel", &["pending"])
        .step("process continue", &STOPPED_AT_BREAKPOINT)
        .step("target variable", &listing)
        .step("breakpoint delete 1", &["1 breakpoints deleted"])
        .step("breakpoint set -f scalars.rs -l 27", &["Breakpoint 2"]);
    for (name, ty, value) in SCALAR_GLOBALS {
        let ty = format!("({ty})");
        spec = spec.inspect_global(name, &[ty.as_str(), value.trim_matches('\'')]);
    }
    spec.step("process continue", &STOPPED_AT_BREAKPOINT)
        .step("expr i_", &["(int)", "10"])
        .step("expr f_", &["(float)", "1"])
}

/// Locals of `simple.rs` at line 146: name, type, printed value.
///
/// Three-element vectors print a fourth padding lane, so only the prefix is
/// matched.
const KERNEL_LOCALS: [(&str, &str, &str); 39] = [
    ("char_local", "signed char", "'\\f'"),
    ("uchar_local", "uchar", "'\\xea'"),
    ("short_local", "short", "-321"),
    ("ushort_local", "ushort", "432"),
    ("int_local", "int", "1234"),
    ("uint_local", "uint", "2345"),
    ("float_local", "float", "4.5"),
    ("long_local", "long long", "-77777"),
    ("ulong_local", "ulong", "8888"),
    ("double_local", "double", "-456.5"),
    ("char2_local", "char2", "(11, -22)"),
    ("uchar2_local", "uchar2", "(0x21, 0x2c)"),
    ("short2_local", "short2", "(-555, 666)"),
    ("ushort2_local", "ushort2", "(777, 888)"),
    ("int2_local", "int2", "(999, -1111)"),
    ("uint2_local", "uint2", "(2222, 3333)"),
    ("float2_local", "float2", "(4.5, -5)"),
    ("ulong2_local", "ulong2", "(6666, 7777)"),
    ("double2_local", "double2", "(88.5, -99)"),
    ("char3_local", "char3", "(11, -22, -33,"),
    ("uchar3_local", "uchar3", "(0x21, 0x2c, 0x37,"),
    ("short3_local", "short3", "(-555, 666, 777,"),
    ("ushort3_local", "ushort3", "(777, 888, 999,"),
    ("int3_local", "int3", "(999, -1111, 2222,"),
    ("uint3_local", "uint3", "(2222, 3333, 4444,"),
    ("float3_local", "float3", "(4.5, -5, -6.5,"),
    ("long3_local", "long3", "(-4444, 5555, 6666,"),
    ("ulong3_local", "ulong3", "(6666, 7777, 8888,"),
    ("double3_local", "double3", "(88.5, -99, 111.5,"),
    ("char4_local", "char4", "(55, 11, -22, -33)"),
    ("uchar4_local", "uchar4", "(0xde, 0x21, 0x2c, 0x37)"),
    ("short4_local", "short4", "(-444, -555, 666, 777)"),
    ("ushort4_local", "ushort4", "(666, 777, 888, 999)"),
    ("int4_local", "int4", "(888, 999, -1111, 2222)"),
    ("uint4_local", "uint4", "(1111, 2222, 3333, 4444)"),
    ("float4_local", "float4", "(3, 4.5, -5, -6.5)"),
    ("long4_local", "long4", "(-3333, -4444, 5555, 6666)"),
    ("ulong4_local", "ulong4", "(5555, 6666, 7777, 8888)"),
    ("double4_local", "double4", "(-77, 88.5, -99, 111.5)"),
];

fn read_local() -> TestSpec {
    let listing: Vec<String> = KERNEL_LOCALS
        .iter()
        .map(|(name, ty, value)| format!("({ty}) {name} = {value}"))
        .collect();
    let listing: Vec<&str> = listing.iter().map(String::as_str).collect();

    let mut spec = TestSpec::new("test_read_local")
        .target("KernelLocalVariables")
        .step(STATUS, &RUNTIME_DISCOVERED)
        .step("breakpoint set --file simple.rs --line 146", &[])
        .step("process continue", &STOPPED_AT_BREAKPOINT)
        .step("frame variable", &listing);
    for (name, ty, value) in KERNEL_LOCALS {
        let ty = format!("({ty})");
        spec = spec.inspect_local(name, &[ty.as_str(), value]);
    }

    // long2 is misaligned on ARM at line 146; it is read from its own kernel.
    spec.step("breakpoint delete 1", &["1 breakpoints deleted"])
        .step(
            "breakpoint set --file simple.rs --line 97",
            &["Breakpoint 2", "long2_only_kernel"],
        )
        .step("process continue", &STOPPED_AT_BREAKPOINT)
        .step("frame variable", &["(long2) long2_local = (-4444, 5555)"])
        .inspect_local("long2_local", &["(long2)", "(-4444, 5555)"])
}

fn read_scalar() -> TestSpec {
    TestSpec::new("test_read_scalar")
        .target("GlobalScalarVariables")
        .step(STATUS, &RUNTIME_DISCOVERED)
        .step("breakpoint set --file scalars.rs --line 47", &["pending"])
        .step("process continue", &STOPPED_AT_BREAKPOINT)
        .step(
            "frame variable",
            &["(int) in", "(int) i", "(float) f", "(int) ret"],
        )
        .inspect_local("ret", &["(int)"])
}

fn source_step() -> TestSpec {
    TestSpec::new("test_source_step")
        .target("GlobalScalarVariables")
        .step("language", &[])
        .step(STATUS, &RUNTIME_DISCOVERED)
        .step("b -f scalars.rs -l 47", &["(pending)"])
        .step(
            "process continue",
            &[
                "stopped",
                "stop reason = breakpoint",
                "scalars.rs:47",
                "-> 47",
                "int i = in;",
            ],
        )
        .step("thread step-in", &["-> 48"])
        .step("thread step-in", &["-> 49"])
        .step("thread step-over", &["-> 50"])
        .step("thread step-in", &["-> 33"])
        .step(
            "b -f scalars.rs -l 38",
            &["librs.scalars.so`modify_i", "scalars.rs:38"],
        )
        .step("c", &["stop reason = breakpoint", "scalars.rs:38", "-> 38"])
        .step("thread step-in", &["-> 22"])
        .step("thread step-out", &["-> 38"])
}
