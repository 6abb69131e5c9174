// Component B: vehicle control side
// Control thread pops perception records, advances the mission state machine,
// runs the steering controller and writes motor/servo commands through the PWM backend.
pub mod steering;
pub mod mission;
pub mod control_loop;

// Actuation stack: driver on top of a PWM channel served by a (possibly managed) daemon
pub mod actuator;
pub mod pwm;
pub mod daemon;
